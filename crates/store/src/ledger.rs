//! Delivery ledger: durable at-most-once bookkeeping per
//! `(client, permit)` pair.
//!
//! Rows are written once, at delivery confirmation, with insert-or-ignore
//! semantics, and never removed. The ledger shares the permits database so
//! ledger state and catalog state travel together.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params_from_iter, Connection};
use rusqlite::types::Value as SqlValue;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::PermitStore;

const LEDGER_DDL: &str = "
CREATE TABLE IF NOT EXISTS sent_permit (
    client_id INTEGER NOT NULL,
    permit_id INTEGER NOT NULL,
    sent_at   TEXT NOT NULL,
    PRIMARY KEY (client_id, permit_id)
);
";

/// Handle to the `sent_permit` ledger table.
#[derive(Clone)]
pub struct DeliveryLedger {
    conn: Arc<Mutex<Connection>>,
}

impl DeliveryLedger {
    /// Attach to the ledger table in `store`'s database, creating it if
    /// absent.
    pub fn new(store: &PermitStore) -> Result<Self, StoreError> {
        let conn = store.connection();
        {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            guard.execute_batch(LEDGER_DDL)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// The subset of `permit_ids` already delivered to `client_id`.
    pub fn already_sent(
        &self,
        client_id: i64,
        permit_ids: &[i64],
    ) -> Result<HashSet<i64>, StoreError> {
        if permit_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.lock()?;
        let mut sent = HashSet::new();
        for batch in permit_ids.chunks(500) {
            let placeholders = vec!["?"; batch.len()].join(",");
            let sql = format!(
                "SELECT permit_id FROM sent_permit \
                 WHERE client_id = ? AND permit_id IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(SqlValue::Integer(client_id))
                .chain(batch.iter().map(|id| SqlValue::Integer(*id)));
            let rows = stmt.query_map(params_from_iter(params), |r| r.get::<_, i64>(0))?;
            for row in rows {
                sent.insert(row?);
            }
        }
        Ok(sent)
    }

    /// `permit_ids` minus those already delivered to `client_id`,
    /// original order preserved.
    pub fn filter_unsent(
        &self,
        client_id: i64,
        permit_ids: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let sent = self.already_sent(client_id, permit_ids)?;
        Ok(permit_ids
            .iter()
            .copied()
            .filter(|id| !sent.contains(id))
            .collect())
    }

    /// Record delivered permits for `client_id`. Idempotent; returns the
    /// count of rows newly recorded.
    pub fn record(&self, client_id: i64, permit_ids: &[i64]) -> Result<usize, StoreError> {
        if permit_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut recorded = 0usize;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO sent_permit (client_id, permit_id, sent_at) \
                 VALUES (?1, ?2, ?3)",
            )?;
            let now = Utc::now();
            for permit_id in permit_ids {
                match stmt.execute(rusqlite::params![client_id, permit_id, now]) {
                    Ok(changed) => recorded += changed,
                    Err(err) => {
                        // A failed row is retried next cycle; redelivery is
                        // preferable to losing the record entirely.
                        warn!(client_id, permit_id, error = %err, "ledger record skipped row");
                    }
                }
            }
        }
        tx.commit()?;
        debug!(client_id, recorded, "ledger record");
        Ok(recorded)
    }

    /// Total pairs recorded, across all clients.
    pub fn len(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sent_permit", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
