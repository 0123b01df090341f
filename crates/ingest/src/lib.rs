//! Permitflow Ingest Layer
//!
//! This is where permit data enters the pipeline. City scrapers hand us raw
//! records keyed however the municipal source happens to key them; we map
//! them onto the canonical permit field set and apply the one normalization
//! policy every later stage relies on.
//!
//! ## What we do here
//!
//! - **Map source keys onto canonical fields** - Each city publishes under
//!   its own column names ("Permit Num", "permit_number", ...). The alias
//!   tables in [`normalize_rows`] collapse them to one record shape.
//! - **Coalesce contact phones** - Sources carry up to seven phone-ish
//!   columns; we fold them onto `contractor_phone` / `applicant_phone` so
//!   the delivery gate can work against declared fields.
//! - **Drop rows without a permit number** - `(city, permit_number)` is the
//!   record identity; a row without it cannot be stored.
//! - **Define the comparison policy** - [`normalize_value`] is the single
//!   normalization used for filter comparison everywhere (store SQL and
//!   in-process grouping agree by construction).
//!
//! ## Scraper contract
//!
//! City scrapers live outside the core and implement [`Scraper`]: fetch raw
//! permits for a date window, raising [`IngestError::SourceUnavailable`] on
//! transport failure. Normalization is ours, not theirs.
//!
//! ## Example
//!
//! ```
//! use ingest::{normalize_rows, RawPermit};
//!
//! let mut raw = RawPermit::new();
//! raw.set("Permit Num", "2024-001234");
//! raw.set("Description", "re-roof existing residence");
//! raw.set("Contractor Phone", "512 555 0134");
//!
//! let permits = normalize_rows("austin", &[raw]);
//! assert_eq!(permits.len(), 1);
//! assert_eq!(permits[0].permit_number, "2024-001234");
//! assert_eq!(permits[0].contractor_phone.as_deref(), Some("512 555 0134"));
//! ```

mod error;
mod normalize;
mod permit;
mod scraper;

pub use crate::error::IngestError;
pub use crate::normalize::{normalize_row, normalize_rows, normalize_value, parse_permit_date};
pub use crate::permit::{NewPermit, Permit, RawPermit};
pub use crate::scraper::Scraper;
