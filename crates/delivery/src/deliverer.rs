//! The deliverer contract and the shipped file-outbox implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use matcher::ClientProfile;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::DeliveryError;
use crate::report::LeadReports;

/// Per-client delivery confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub client_id: i64,
    pub rows_delivered: usize,
}

/// Contract for the external delivery transport (SMTP in production).
///
/// Every row in every report is already guaranteed a contact phone; the
/// implementation may aggregate or batch internally but must report
/// success or failure per client.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(
        &self,
        client: &ClientProfile,
        reports: &LeadReports,
    ) -> Result<DeliveryOutcome, DeliveryError>;
}

/// Writes each client's report artifacts to an outbox directory. The
/// default transport for local runs and a fixture for tests; production
/// deployments swap in an SMTP-backed implementation.
pub struct OutboxDeliverer {
    dir: PathBuf,
}

impl OutboxDeliverer {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Deliverer for OutboxDeliverer {
    async fn deliver(
        &self,
        client: &ClientProfile,
        reports: &LeadReports,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let transport_err = |e: std::io::Error| DeliveryError::Transport(e.to_string());
        std::fs::create_dir_all(&self.dir).map_err(transport_err)?;

        let artifacts = [
            ("inclusion", &reports.inclusion_csv),
            ("exclusion", &reports.exclusion_csv),
            ("semantic", &reports.semantic_csv),
        ];
        for (label, csv) in artifacts {
            let path = self.dir.join(format!("client_{}_{label}.csv", client.id));
            std::fs::write(&path, csv).map_err(transport_err)?;
        }

        info!(
            client_id = client.id,
            rows = reports.total_rows(),
            outbox = %self.dir.display(),
            "reports written to outbox"
        );
        Ok(DeliveryOutcome {
            client_id: client.id,
            rows_delivered: reports.semantic_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::build_reports;
    use matcher::ResultSets;

    #[tokio::test]
    async fn outbox_writes_three_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let client = ClientProfile {
            id: 3,
            name: "Roofline".into(),
            ..Default::default()
        };
        let reports = build_reports(&client, &ResultSets::default()).unwrap();

        let deliverer = OutboxDeliverer::new(dir.path());
        let outcome = deliverer.deliver(&client, &reports).await.unwrap();
        assert_eq!(outcome.client_id, 3);
        assert_eq!(outcome.rows_delivered, 0);

        for label in ["inclusion", "exclusion", "semantic"] {
            assert!(dir.path().join(format!("client_3_{label}.csv")).exists());
        }
    }
}
