//! Cycle summaries: what an on-demand trigger gets back, and what the
//! scheduler logs after every timed run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage the cycle is currently in. At most one cycle is ever outside
/// `Idle`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CycleStage {
    #[default]
    Idle,
    Scraping,
    Reindexing,
    Matching,
    Resolving,
    Delivering,
    Recording,
}

/// Per-source scrape outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceOutcome {
    pub source: String,
    pub fetched: usize,
    pub inserted: usize,
    pub error: Option<String>,
}

/// How the reindex step ran.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ReindexOutcome {
    Full { built: usize },
    Incremental { added: usize },
    Skipped { vectors: usize },
    Failed { error: String },
}

/// Per-client matching + delivery outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientOutcome {
    pub client_id: i64,
    pub name: String,
    /// Semantic rows surviving resolution and both pre-delivery gates.
    pub rows: usize,
    pub delivered: bool,
    pub error: Option<String>,
}

/// Full account of one cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CycleSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceOutcome>,
    pub reindex: Option<ReindexOutcome>,
    pub clients: Vec<ClientOutcome>,
    /// True when the zero-row relaxed pass ran.
    pub relaxed_pass: bool,
    /// Stage at which the cycle was cancelled, if it was.
    pub cancelled_at: Option<CycleStage>,
    /// Fatal condition that aborted the cycle (nothing delivered).
    pub fatal: Option<String>,
}

impl CycleSummary {
    /// Total rows handed to the deliverer across clients.
    pub fn total_rows(&self) -> usize {
        self.clients.iter().map(|c| c.rows).sum()
    }

    pub fn delivered_clients(&self) -> usize {
        self.clients.iter().filter(|c| c.delivered).count()
    }
}
