//! Permitflow Matcher
//!
//! Turns one [`ClientProfile`] into three result sets through a fixed
//! four-stage pipeline:
//!
//! 1. **Structural filter** — the client's declared city / permit type /
//!    permit class / work classes (with request-level overrides taking
//!    precedence) bound a candidate pool of at most 1000 rows.
//! 2. **Inclusion keywords** — whole-word OR filter over the description;
//!    pass-through when the client declares none. The survivors are the
//!    Inclusion Result Set.
//! 3. **Exclusion keywords** — partitions the inclusion set. Removed rows
//!    carry a human-readable reason and become the Exclusion Result Set,
//!    delivered for auditability only.
//! 4. **Semantic ranking** — the cleaned set is ranked against the
//!    client's query (request override → saved query → inferred from
//!    structural preferences) and capped; this Semantic Result Set is the
//!    only one subject to contention and at-most-once delivery.
//!
//! A matcher failure for one client never aborts the cycle for the rest;
//! the orchestrator records the error and moves on.

mod directory;
mod engine;
mod keywords;
mod types;

pub use crate::directory::{ClientDirectory, SqliteClientDirectory};
pub use crate::engine::{ClientMatcher, MatchSettings};
pub use crate::keywords::{first_matching_keyword, whole_word_match};
pub use crate::types::{
    ClientAssignment, ClientProfile, ClientSelection, ClientStatus, ExcludedPermit, MatchError,
    MatchOverrides, ResultSets,
};
