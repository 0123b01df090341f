use thiserror::Error;

/// Errors surfaced by unified search.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("index error: {0}")]
    Index(#[from] index::IndexError),
}
