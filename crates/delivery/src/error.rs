use thiserror::Error;

/// Errors surfaced at the delivery boundary. Per-client: a failed client
/// is not recorded in the ledger and is retried next cycle.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("report build error: {0}")]
    Report(String),

    #[error("delivery transport error: {0}")]
    Transport(String),
}
