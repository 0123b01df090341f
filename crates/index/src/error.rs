use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the index manager.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Incremental build requested but no artifacts exist yet. The
    /// orchestrator escalates this to a full build.
    #[error("index artifacts missing under {0}")]
    Missing(PathBuf),

    /// The artifact triple disagrees with itself on load. Forces a full
    /// rebuild on the next cycle.
    #[error("index artifacts inconsistent: {0}")]
    Inconsistent(String),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hash file error: {0}")]
    Json(#[from] serde_json::Error),

    /// The exclusive build lock was poisoned by a panicking builder.
    #[error("index build lock poisoned")]
    Poisoned,
}
