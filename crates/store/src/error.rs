use thiserror::Error;

/// Errors surfaced by the permit store and the delivery ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The shared connection mutex was poisoned by a panicking writer.
    #[error("store connection lock poisoned")]
    Poisoned,
}
