use ingest::Permit;
use retrieval::{RetrievalError, ScoredPermit};
use serde::{Deserialize, Serialize};
use store::{PermitFilter, StoreError};
use thiserror::Error;

/// Whether a client participates in match cycles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
}

/// A subscribing client's declared preferences.
///
/// Owned by the external client store; the core reads a consistent
/// snapshot at the start of each match cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    /// Structural equality filters. `work_classes` carries
    /// at-least-one-of semantics.
    pub city: Option<String>,
    pub permit_type: Option<String>,
    pub permit_class_mapped: Option<String>,
    pub work_classes: Vec<String>,
    /// Free-text seed for semantic ranking.
    pub rag_query: Option<String>,
    /// Whole-word OR keyword preferences.
    pub keywords_include: Vec<String>,
    pub keywords_exclude: Vec<String>,
    /// Declared demand as a share of the candidate pool, in [1, 100].
    pub slider_percentage: u8,
    /// Contention tie-breaker; lower is stronger.
    pub priority: u32,
    pub status: ClientStatus,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            email: String::new(),
            city: None,
            permit_type: None,
            permit_class_mapped: None,
            work_classes: Vec::new(),
            rag_query: None,
            keywords_include: Vec::new(),
            keywords_exclude: Vec::new(),
            slider_percentage: 100,
            priority: 1,
            status: ClientStatus::Active,
        }
    }
}

/// Which clients to load for a cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientSelection {
    pub client_ids: Option<Vec<i64>>,
    pub status: Option<ClientStatus>,
}

impl ClientSelection {
    pub fn active() -> Self {
        Self {
            client_ids: None,
            status: Some(ClientStatus::Active),
        }
    }
}

/// Request-level overrides that supersede a client's saved preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchOverrides {
    /// Ad-hoc query; takes precedence over the client's `rag_query`.
    pub query: Option<String>,
    /// Ad-hoc filter fields; each non-empty field replaces the client's.
    pub filter: Option<PermitFilter>,
    pub keywords_include: Option<Vec<String>>,
    pub keywords_exclude: Option<Vec<String>>,
    /// When false, saved client preferences (query, keywords) are ignored
    /// entirely rather than merely overridden.
    pub use_client_prefs: bool,
    pub per_client_top_k: Option<usize>,
}

impl Default for MatchOverrides {
    fn default() -> Self {
        Self {
            query: None,
            filter: None,
            keywords_include: None,
            keywords_exclude: None,
            use_client_prefs: true,
            per_client_top_k: None,
        }
    }
}

/// A permit removed by the exclusion stage, with the reason it was
/// removed. Delivered for auditability only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExcludedPermit {
    pub permit: Permit,
    pub reason: String,
}

/// The three per-client result sets produced by the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultSets {
    /// Rows surviving the inclusion-keyword stage.
    pub inclusion: Vec<Permit>,
    /// Rows removed by the exclusion stage (audit artifact; never subject
    /// to contention or ledger dedup).
    pub exclusion: Vec<ExcludedPermit>,
    /// Semantically ranked cleaned rows; the only set subject to
    /// contention and at-most-once delivery.
    pub semantic: Vec<ScoredPermit>,
}

/// One client's matched output, as handed to the resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientAssignment {
    pub client: ClientProfile,
    pub sets: ResultSets,
}

/// Errors surfaced by matching. Per-client failures are contained by the
/// cycle; the offending client is skipped and reported.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("client directory error: {0}")]
    Directory(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_status_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&ClientStatus::Active).unwrap(),
            "\"active\""
        );
        let status: ClientStatus = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(status, ClientStatus::Inactive);
    }

    #[test]
    fn overrides_default_to_client_prefs() {
        let overrides = MatchOverrides::default();
        assert!(overrides.use_client_prefs);
        assert!(overrides.query.is_none());
        assert!(overrides.per_client_top_k.is_none());
    }
}
