use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::IngestError;
use crate::permit::RawPermit;

/// Contract for a city scraper. Implementations live outside the core.
///
/// `scrape` fetches raw permits for the inclusive `[start, end]` calendar
/// window. An empty vec means no data for the window; transport failures
/// must surface as [`IngestError::SourceUnavailable`] so the orchestrator
/// can record the source as down and continue the cycle.
///
/// Normalization onto the canonical field set is not the scraper's job;
/// the orchestrator runs [`crate::normalize_rows`] over whatever comes
/// back.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawPermit>, IngestError>;
}
