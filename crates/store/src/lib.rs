//! Permitflow Store
//!
//! Authoritative, queryable permit catalog over SQLite, plus the delivery
//! ledger that backs at-most-once delivery (see [`ledger`]).
//!
//! ## Core behaviors
//!
//! - **Idempotent ingest**: inserts are `INSERT OR IGNORE` keyed on the
//!   unique `(city, permit_number)` pair; re-inserting a batch reports zero
//!   new rows. Malformed rows are logged and skipped, never aborting the
//!   batch.
//! - **Filtered retrieval**: equality filters (OR within a field, AND
//!   across fields) plus date-range predicates, compared under the ingest
//!   normalization policy on both sides. The policy is registered as the
//!   `permit_norm` SQL scalar function so the database and the rest of the
//!   pipeline can never disagree about what "equal" means.
//! - **Order policy**: `issued_date DESC` up to 500 rows; a randomized
//!   sample beyond that, so semantic re-ranking downstream still sees
//!   historical rows instead of only the newest page.
//! - **Index feed**: [`PermitStore::stream_chunks`] walks the whole catalog
//!   once in id order, bounded chunks, for the embedding index builder.
//!
//! The store is cheap to clone and safe to share: a single connection
//! behind an `Arc<Mutex<_>>`, writers serialized by the ingest stage.

mod error;
mod filter;
pub mod ledger;
mod schema;

pub use crate::error::StoreError;
pub use crate::filter::PermitFilter;
pub use crate::ledger::DeliveryLedger;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use ingest::{normalize_row, normalize_value, NewPermit, Permit, RawPermit};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Row limit at which filtered retrieval switches from recency ordering to
/// a randomized sample.
const RECENCY_ORDER_LIMIT: usize = 500;

/// Upper bound on one streamed chunk.
const MAX_STREAM_CHUNK: usize = 2000;

/// Bound parameters per `IN` list when fetching by id.
const ID_BATCH: usize = 500;

const PERMIT_COLUMNS: &str = "id, city, permit_number, permit_type, permit_class_mapped, \
     work_class, current_status, description, applied_date, issued_date, \
     applicant_name, applicant_address, applicant_phone, contractor_name, \
     contractor_company_name, contractor_phone, contractor_address, created_at";

/// Outcome of a batched insert.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows newly written this call.
    pub inserted: usize,
    /// Duplicates and malformed rows skipped.
    pub skipped: usize,
}

/// Distinct values per filterable column, for external dashboards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterValues {
    pub cities: Vec<String>,
    pub permit_types: Vec<String>,
    pub permit_classes: Vec<String>,
    pub work_classes: Vec<String>,
    pub statuses: Vec<String>,
}

/// Handle to the permits database.
#[derive(Clone)]
pub struct PermitStore {
    conn: Arc<Mutex<Connection>>,
}

impl PermitStore {
    /// Open (creating if absent) the permits database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an ephemeral in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        register_norm_function(&conn)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared connection handle, for the ledger living in the same
    /// database file.
    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Normalize and insert a scraped batch for `city`.
    ///
    /// Rows lacking a permit number are counted as skipped; duplicates on
    /// `(city, permit_number)` are skipped silently.
    pub fn insert_raw(&self, city: &str, rows: &[RawPermit]) -> Result<InsertOutcome, StoreError> {
        let mut canonical = Vec::with_capacity(rows.len());
        let mut malformed = 0usize;
        for raw in rows {
            match normalize_row(city, raw) {
                Some(permit) => canonical.push(permit),
                None => {
                    malformed += 1;
                    debug!(city, "skipping raw row without permit number");
                }
            }
        }
        if malformed > 0 {
            warn!(city, malformed, "insert_raw skipped malformed rows");
        }

        let mut outcome = self.insert(&canonical)?;
        outcome.skipped += malformed;
        Ok(outcome)
    }

    /// Insert canonical records, skipping `(city, permit_number)`
    /// duplicates.
    pub fn insert(&self, permits: &[NewPermit]) -> Result<InsertOutcome, StoreError> {
        if permits.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut outcome = InsertOutcome::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO permits (
                    city, permit_number, permit_type, permit_class_mapped,
                    work_class, current_status, description, applied_date,
                    issued_date, applicant_name, applicant_address,
                    applicant_phone, contractor_name, contractor_company_name,
                    contractor_phone, contractor_address, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?;
            let now = Utc::now();
            for permit in permits {
                let changed = stmt.execute(rusqlite::params![
                    permit.city,
                    permit.permit_number,
                    permit.permit_type,
                    permit.permit_class_mapped,
                    permit.work_class,
                    permit.current_status,
                    permit.description,
                    permit.applied_date,
                    permit.issued_date,
                    permit.applicant_name,
                    permit.applicant_address,
                    permit.applicant_phone,
                    permit.contractor_name,
                    permit.contractor_company_name,
                    permit.contractor_phone,
                    permit.contractor_address,
                    now,
                ])?;
                if changed == 1 {
                    outcome.inserted += 1;
                } else {
                    outcome.skipped += 1;
                }
            }
        }
        tx.commit()?;

        info!(
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            "insert batch committed"
        );
        Ok(outcome)
    }

    /// Filtered retrieval under the §order policy: recency up to
    /// [`RECENCY_ORDER_LIMIT`] rows, randomized sample beyond.
    pub fn query_filtered(
        &self,
        filter: &PermitFilter,
        limit: usize,
    ) -> Result<Vec<Permit>, StoreError> {
        let (predicates, mut params) = filter.to_sql();
        let order = if limit <= RECENCY_ORDER_LIMIT {
            "ORDER BY issued_date DESC"
        } else {
            "ORDER BY RANDOM()"
        };
        let sql = format!(
            "SELECT {PERMIT_COLUMNS} FROM permits WHERE 1=1{predicates} {order} LIMIT ?"
        );
        params.push(SqlValue::Integer(limit as i64));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), row_to_permit)?;
        let permits = rows.collect::<Result<Vec<_>, _>>()?;
        debug!(count = permits.len(), limit, "query_filtered");
        Ok(permits)
    }

    /// Case-insensitive substring search on `description` over the
    /// filtered pool, most recent first.
    pub fn query_description_substring(
        &self,
        filter: &PermitFilter,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Permit>, StoreError> {
        let (predicates, mut params) = filter.to_sql();
        let sql = format!(
            "SELECT {PERMIT_COLUMNS} FROM permits WHERE 1=1{predicates} \
             AND LOWER(description) LIKE '%' || LOWER(?) || '%' \
             ORDER BY issued_date DESC LIMIT ?"
        );
        params.push(SqlValue::Text(query.trim().to_string()));
        params.push(SqlValue::Integer(limit as i64));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), row_to_permit)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Fetch specific permits by surrogate id, ascending id order.
    pub fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Permit>, StoreError> {
        let mut permits = Vec::with_capacity(ids.len());
        let conn = self.lock()?;
        for batch in ids.chunks(ID_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(",");
            let sql = format!(
                "SELECT {PERMIT_COLUMNS} FROM permits WHERE id IN ({placeholders}) ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params_from_iter(batch.iter().map(|id| SqlValue::Integer(*id))),
                row_to_permit,
            )?;
            for row in rows {
                permits.push(row?);
            }
        }
        permits.sort_by_key(|p| p.id);
        Ok(permits)
    }

    /// Single-pass chunked iteration over the whole catalog in id order.
    ///
    /// `chunk_size` is clamped to 2000 rows.
    pub fn stream_chunks(&self, chunk_size: usize) -> ChunkIter {
        ChunkIter {
            conn: Arc::clone(&self.conn),
            chunk_size: chunk_size.clamp(1, MAX_STREAM_CHUNK),
            last_id: 0,
            done: false,
        }
    }

    /// Total row count.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM permits", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// Highest surrogate id, or 0 for an empty catalog.
    pub fn max_id(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        let max: Option<i64> =
            conn.query_row("SELECT MAX(id) FROM permits", [], |r| r.get(0))?;
        Ok(max.unwrap_or(0))
    }

    /// Distinct non-empty values per filterable column, sorted.
    pub fn filter_values(&self) -> Result<FilterValues, StoreError> {
        let conn = self.lock()?;
        let distinct = |column: &str| -> Result<Vec<String>, StoreError> {
            let sql = format!(
                "SELECT DISTINCT {column} FROM permits \
                 WHERE {column} IS NOT NULL AND TRIM({column}) != '' ORDER BY {column}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        };

        Ok(FilterValues {
            cities: distinct("city")?,
            permit_types: distinct("permit_type")?,
            permit_classes: distinct("permit_class_mapped")?,
            work_classes: distinct("work_class")?,
            statuses: distinct("current_status")?,
        })
    }
}

/// Chunked catalog iterator produced by [`PermitStore::stream_chunks`].
pub struct ChunkIter {
    conn: Arc<Mutex<Connection>>,
    chunk_size: usize,
    last_id: i64,
    done: bool,
}

impl Iterator for ChunkIter {
    type Item = Result<Vec<Permit>, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let chunk = (|| -> Result<Vec<Permit>, StoreError> {
            let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
            let sql = format!(
                "SELECT {PERMIT_COLUMNS} FROM permits WHERE id > ? ORDER BY id LIMIT ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params![self.last_id, self.chunk_size as i64],
                row_to_permit,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })();

        match chunk {
            Ok(rows) if rows.is_empty() => {
                self.done = true;
                None
            }
            Ok(rows) => {
                self.last_id = rows.last().map(|p| p.id).unwrap_or(self.last_id);
                if rows.len() < self.chunk_size {
                    self.done = true;
                }
                Some(Ok(rows))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn register_norm_function(conn: &Connection) -> Result<(), StoreError> {
    conn.create_scalar_function(
        "permit_norm",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| normalize_value(&v)))
        },
    )?;
    Ok(())
}

fn row_to_permit(row: &Row<'_>) -> rusqlite::Result<Permit> {
    Ok(Permit {
        id: row.get(0)?,
        city: row.get(1)?,
        permit_number: row.get(2)?,
        permit_type: row.get(3)?,
        permit_class_mapped: row.get(4)?,
        work_class: row.get(5)?,
        current_status: row.get(6)?,
        description: row.get(7)?,
        applied_date: row.get(8)?,
        issued_date: row.get(9)?,
        applicant_name: row.get(10)?,
        applicant_address: row.get(11)?,
        applicant_phone: row.get(12)?,
        contractor_name: row.get(13)?,
        contractor_company_name: row.get(14)?,
        contractor_phone: row.get(15)?,
        contractor_address: row.get(16)?,
        created_at: row.get(17)?,
    })
}
