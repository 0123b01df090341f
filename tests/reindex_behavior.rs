//! Reindex policy across cycles: full build first, incremental refresh
//! while artifacts lag the catalog, full rebuild on corruption.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use delivery::{Deliverer, DeliveryError, DeliveryOutcome, LeadReports};
use ingest::RawPermit;
use matcher::{ClientDirectory, ClientProfile, SqliteClientDirectory};
use permitflow::{CancelToken, Config, Engine, ReindexOutcome};

#[derive(Default)]
struct NullDeliverer {
    calls: StdMutex<usize>,
}

#[async_trait]
impl Deliverer for NullDeliverer {
    async fn deliver(
        &self,
        client: &ClientProfile,
        reports: &LeadReports,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        *self.calls.lock().unwrap() += 1;
        Ok(DeliveryOutcome {
            client_id: client.id,
            rows_delivered: reports.semantic_rows,
        })
    }
}

fn raw_permit(number: &str) -> RawPermit {
    let mut raw = RawPermit::new();
    raw.set("permit_number", number);
    raw.set("description", format!("roof work {number}"));
    raw.set("contractor_phone", "5125550134");
    raw
}

struct Harness {
    _dir: tempfile::TempDir,
    index_dir: std::path::PathBuf,
    engine: Arc<Engine>,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let index_dir = dir.path().join("rag_index");
    let config = Config {
        permits_db_path: dir.path().join("permits.db"),
        clients_db_path: dir.path().join("clients.db"),
        rag_index_dir: index_dir.clone(),
        ..Default::default()
    };
    let directory = Arc::new(SqliteClientDirectory::open(&config.clients_db_path).unwrap());
    let engine = Arc::new(
        Engine::new(
            config,
            directory as Arc<dyn ClientDirectory>,
            Arc::new(NullDeliverer::default()),
            HashMap::new(),
        )
        .unwrap(),
    );
    Harness {
        _dir: dir,
        index_dir,
        engine,
    }
}

#[tokio::test]
async fn first_cycle_builds_then_later_cycles_append() {
    let h = harness();
    h.engine
        .store()
        .insert_raw("austin", &[raw_permit("A-1"), raw_permit("A-2")])
        .unwrap();

    let first = h.engine.run_cycle(&CancelToken::new()).await.unwrap();
    assert_eq!(first.reindex, Some(ReindexOutcome::Full { built: 2 }));

    // Catalog grows between cycles; the next cycle only appends.
    h.engine
        .store()
        .insert_raw("austin", &[raw_permit("A-3")])
        .unwrap();
    let second = h.engine.run_cycle(&CancelToken::new()).await.unwrap();
    assert_eq!(second.reindex, Some(ReindexOutcome::Incremental { added: 1 }));

    // Nothing new: the reindex step is a no-op.
    let third = h.engine.run_cycle(&CancelToken::new()).await.unwrap();
    assert_eq!(third.reindex, Some(ReindexOutcome::Skipped { vectors: 3 }));
}

#[tokio::test]
async fn corrupt_artifacts_force_a_full_rebuild() {
    let h = harness();
    h.engine
        .store()
        .insert_raw("austin", &[raw_permit("A-1"), raw_permit("A-2")])
        .unwrap();
    h.engine.run_cycle(&CancelToken::new()).await.unwrap();

    // Truncate the id map so the triple disagrees with itself.
    let idmap = h.index_dir.join("idmap.bin");
    let bytes = std::fs::read(&idmap).unwrap();
    std::fs::write(&idmap, &bytes[..bytes.len() - 8]).unwrap();

    let summary = h.engine.run_cycle(&CancelToken::new()).await.unwrap();
    assert_eq!(summary.reindex, Some(ReindexOutcome::Full { built: 2 }));
    assert!(h.engine.index().status().loaded);
}

#[tokio::test]
async fn missing_artifacts_escalate_to_full_build() {
    let h = harness();
    h.engine
        .store()
        .insert_raw("austin", &[raw_permit("A-1")])
        .unwrap();
    h.engine.run_cycle(&CancelToken::new()).await.unwrap();

    std::fs::remove_dir_all(&h.index_dir).unwrap();

    let summary = h.engine.run_cycle(&CancelToken::new()).await.unwrap();
    assert_eq!(summary.reindex, Some(ReindexOutcome::Full { built: 1 }));
}
