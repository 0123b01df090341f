use thiserror::Error;

/// Errors surfaced by the ingest boundary.
///
/// Both variants are locally contained by callers: an unavailable source
/// contributes zero rows to the cycle, and a malformed row is dropped
/// without aborting its batch.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Scraper transport failure (HTTP error, timeout, bad payload shape).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single raw row could not be interpreted.
    #[error("malformed row: {0}")]
    MalformedRow(String),
}
