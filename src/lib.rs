//! Permitflow: a construction-permit lead distribution engine.
//!
//! Public building-permit records flow in from municipal sources, get
//! normalized into one canonical record, land in a SQLite catalog with a
//! persistent embedding index over their descriptions, and every cycle
//! the engine matches new permits against subscribing clients and
//! distributes them as lead reports — each permit delivered at most once
//! per `(client, permit)` pair.
//!
//! The layers live in their own crates and this umbrella wires them into
//! the periodic workflow:
//!
//! - [`ingest`] — raw scraper records, the canonical permit model, the
//!   one normalization policy, the scraper contract.
//! - [`store`] — permit catalog and delivery ledger over SQLite.
//! - [`embedding`] / [`index`] — deterministic description embeddings and
//!   the persistent artifact triple they live in.
//! - [`retrieval`] — keyword, semantic, and dual search with structured
//!   pre-filters.
//! - [`matcher`] — the per-client four-stage pipeline producing the three
//!   result sets.
//! - [`resolver`] — contention groups, proportional allocation, global
//!   exclusivity.
//! - [`delivery`] — CSV report artifacts, the contact-phone gate, the
//!   deliverer contract.
//!
//! The pieces owned here: [`Config`] (one YAML file, read at startup),
//! [`Engine`] (the cycle orchestrator and its single-cycle gate), and
//! [`Scheduler`] (the 4-hour timer plus on-demand triggers).
//!
//! ## Running a cycle by hand
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use permitflow::{CancelToken, Config, Engine};
//! use delivery::OutboxDeliverer;
//! use matcher::SqliteClientDirectory;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_yaml_file("permitflow.yaml")?;
//! let directory = Arc::new(SqliteClientDirectory::open(&config.clients_db_path)?);
//! let deliverer = Arc::new(OutboxDeliverer::new("data/outbox"));
//! let engine = Engine::new(config, directory, deliverer, HashMap::new())?;
//!
//! let summary = engine.run_cycle(&CancelToken::new()).await?;
//! println!("delivered rows: {}", summary.total_rows());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cycle;
pub mod scheduler;
pub mod summary;

pub use crate::config::{Config, ConfigError, SourceConfig};
pub use crate::cycle::{CancelToken, CycleError, Engine, StatusReport};
pub use crate::scheduler::Scheduler;
pub use crate::summary::{
    ClientOutcome, CycleStage, CycleSummary, ReindexOutcome, SourceOutcome,
};

pub use delivery;
pub use embedding;
pub use index;
pub use ingest;
pub use matcher;
pub use resolver;
pub use retrieval;
pub use store;
