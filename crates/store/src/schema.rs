//! Schema definition for the permits database.
//!
//! One `permits` table keyed by a strictly-increasing surrogate id with a
//! unique secondary key on `(city, permit_number)`, indexed on
//! `issued_date` for recency ordering and on each filterable column for
//! selectivity. The `sent_permit` ledger table lives in the same database
//! (see [`crate::ledger`]).

use rusqlite::Connection;

use crate::error::StoreError;

const PERMITS_DDL: &str = "
CREATE TABLE IF NOT EXISTS permits (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    city                    TEXT NOT NULL,
    permit_number           TEXT NOT NULL,
    permit_type             TEXT,
    permit_class_mapped     TEXT,
    work_class              TEXT,
    current_status          TEXT,
    description             TEXT NOT NULL DEFAULT '',
    applied_date            TEXT,
    issued_date             TEXT,
    applicant_name          TEXT,
    applicant_address       TEXT,
    applicant_phone         TEXT,
    contractor_name         TEXT,
    contractor_company_name TEXT,
    contractor_phone        TEXT,
    contractor_address      TEXT,
    created_at              TEXT NOT NULL,
    UNIQUE (city, permit_number)
);
CREATE INDEX IF NOT EXISTS idx_permits_issued_date ON permits (issued_date);
CREATE INDEX IF NOT EXISTS idx_permits_city ON permits (city);
CREATE INDEX IF NOT EXISTS idx_permits_permit_type ON permits (permit_type);
CREATE INDEX IF NOT EXISTS idx_permits_permit_class ON permits (permit_class_mapped);
CREATE INDEX IF NOT EXISTS idx_permits_work_class ON permits (work_class);
CREATE INDEX IF NOT EXISTS idx_permits_status ON permits (current_status);
";

pub(crate) fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(PERMITS_DDL)?;
    Ok(())
}
