//! Client profile access.
//!
//! Profiles are owned by an external client system; the core only needs a
//! consistent snapshot per cycle, expressed by [`ClientDirectory`]. A
//! SQLite implementation ships for deployments where profiles live in a
//! second database file next to the permit catalog (a `clients` table plus
//! a `workclass` join table).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use serde_json::Value;
use tracing::warn;

use crate::types::{ClientProfile, ClientSelection, ClientStatus, MatchError};

/// Snapshot source for client profiles.
pub trait ClientDirectory: Send + Sync {
    fn list_clients(&self, selection: &ClientSelection) -> Result<Vec<ClientProfile>, MatchError>;
}

const CLIENTS_DDL: &str = "
CREATE TABLE IF NOT EXISTS clients (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    name                TEXT NOT NULL,
    email               TEXT NOT NULL,
    city                TEXT,
    permit_type         TEXT,
    permit_class_mapped TEXT,
    rag_query           TEXT,
    keywords_include    TEXT NOT NULL DEFAULT '[]',
    keywords_exclude    TEXT NOT NULL DEFAULT '[]',
    slider_percentage   INTEGER NOT NULL DEFAULT 100,
    priority            INTEGER NOT NULL DEFAULT 1,
    status              TEXT NOT NULL DEFAULT 'active'
);
CREATE TABLE IF NOT EXISTS workclass (
    client_id INTEGER NOT NULL,
    name      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workclass_client ON workclass (client_id);
";

/// SQLite-backed [`ClientDirectory`].
#[derive(Clone)]
pub struct SqliteClientDirectory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteClientDirectory {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MatchError> {
        Self::from_connection(Connection::open(path).map_err(directory_err)?)
    }

    pub fn open_in_memory() -> Result<Self, MatchError> {
        Self::from_connection(Connection::open_in_memory().map_err(directory_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, MatchError> {
        conn.execute_batch(CLIENTS_DDL).map_err(directory_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, MatchError> {
        self.conn
            .lock()
            .map_err(|_| MatchError::Directory("connection lock poisoned".into()))
    }

    /// Write a profile. Client CRUD proper lives outside the core; this
    /// exists for provisioning and tests.
    pub fn insert_client(&self, client: &ClientProfile) -> Result<i64, MatchError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO clients (
                name, email, city, permit_type, permit_class_mapped, rag_query,
                keywords_include, keywords_exclude, slider_percentage, priority, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                client.name,
                client.email,
                client.city,
                client.permit_type,
                client.permit_class_mapped,
                client.rag_query,
                serde_json::to_string(&client.keywords_include).map_err(directory_err)?,
                serde_json::to_string(&client.keywords_exclude).map_err(directory_err)?,
                client.slider_percentage as i64,
                client.priority as i64,
                match client.status {
                    ClientStatus::Active => "active",
                    ClientStatus::Inactive => "inactive",
                },
            ],
        )
        .map_err(directory_err)?;
        let id = conn.last_insert_rowid();

        for work_class in &client.work_classes {
            conn.execute(
                "INSERT INTO workclass (client_id, name) VALUES (?1, ?2)",
                rusqlite::params![id, work_class],
            )
            .map_err(directory_err)?;
        }
        Ok(id)
    }
}

impl ClientDirectory for SqliteClientDirectory {
    fn list_clients(&self, selection: &ClientSelection) -> Result<Vec<ClientProfile>, MatchError> {
        let conn = self.lock()?;

        let mut sql = String::from(
            "SELECT id, name, email, city, permit_type, permit_class_mapped, rag_query, \
             keywords_include, keywords_exclude, slider_percentage, priority, status \
             FROM clients WHERE 1=1",
        );
        let mut params: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(ids) = &selection.client_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(",");
            sql.push_str(&format!(" AND id IN ({placeholders})"));
            params.extend(ids.iter().map(|id| rusqlite::types::Value::Integer(*id)));
        }
        if let Some(status) = selection.status {
            sql.push_str(" AND status = ?");
            params.push(rusqlite::types::Value::Text(
                match status {
                    ClientStatus::Active => "active",
                    ClientStatus::Inactive => "inactive",
                }
                .to_string(),
            ));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = conn.prepare(&sql).map_err(directory_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok(RawClientRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    city: row.get(3)?,
                    permit_type: row.get(4)?,
                    permit_class_mapped: row.get(5)?,
                    rag_query: row.get(6)?,
                    keywords_include: row.get(7)?,
                    keywords_exclude: row.get(8)?,
                    slider_percentage: row.get(9)?,
                    priority: row.get(10)?,
                    status: row.get(11)?,
                })
            })
            .map_err(directory_err)?;

        let mut clients = Vec::new();
        for row in rows {
            let raw = row.map_err(directory_err)?;
            let work_classes = load_work_classes(&conn, raw.id)?;
            clients.push(raw.into_profile(work_classes));
        }
        Ok(clients)
    }
}

struct RawClientRow {
    id: i64,
    name: String,
    email: String,
    city: Option<String>,
    permit_type: Option<String>,
    permit_class_mapped: Option<String>,
    rag_query: Option<String>,
    keywords_include: String,
    keywords_exclude: String,
    slider_percentage: i64,
    priority: i64,
    status: String,
}

impl RawClientRow {
    fn into_profile(self, work_classes: Vec<String>) -> ClientProfile {
        let status = match self.status.as_str() {
            "active" => ClientStatus::Active,
            "inactive" => ClientStatus::Inactive,
            other => {
                warn!(client_id = self.id, status = other, "unknown client status; treating as inactive");
                ClientStatus::Inactive
            }
        };
        ClientProfile {
            id: self.id,
            name: self.name,
            email: self.email,
            city: self.city,
            permit_type: self.permit_type,
            permit_class_mapped: self.permit_class_mapped,
            rag_query: self.rag_query,
            work_classes,
            keywords_include: parse_keywords(&self.keywords_include),
            keywords_exclude: parse_keywords(&self.keywords_exclude),
            slider_percentage: self.slider_percentage.clamp(1, 100) as u8,
            priority: self.priority.clamp(1, i64::from(u32::MAX)) as u32,
            status,
        }
    }
}

fn load_work_classes(conn: &Connection, client_id: i64) -> Result<Vec<String>, MatchError> {
    let mut stmt = conn
        .prepare("SELECT name FROM workclass WHERE client_id = ? ORDER BY name")
        .map_err(directory_err)?;
    let rows = stmt
        .query_map([client_id], |row| row.get::<_, String>(0))
        .map_err(directory_err)?;
    let mut names = Vec::new();
    for row in rows {
        let name = row.map_err(directory_err)?;
        if !name.trim().is_empty() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Keyword columns hold JSON arrays; anything that is not a non-empty
/// string is dropped so keyword sets are free of null entries after load.
fn parse_keywords(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(values) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Err(err) => {
            warn!(error = %err, "unparseable keyword column; treating as empty");
            Vec::new()
        }
    }
}

fn directory_err<E: std::fmt::Display>(err: E) -> MatchError {
    MatchError::Directory(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client(name: &str, status: ClientStatus) -> ClientProfile {
        ClientProfile {
            name: name.into(),
            email: format!("{name}@example.com"),
            city: Some("austin".into()),
            work_classes: vec!["Residential".into()],
            keywords_include: vec!["roof".into()],
            slider_percentage: 60,
            priority: 2,
            status,
            ..Default::default()
        }
    }

    #[test]
    fn roundtrips_a_profile() {
        let directory = SqliteClientDirectory::open_in_memory().unwrap();
        let id = directory
            .insert_client(&sample_client("acme", ClientStatus::Active))
            .unwrap();

        let clients = directory.list_clients(&ClientSelection::default()).unwrap();
        assert_eq!(clients.len(), 1);
        let client = &clients[0];
        assert_eq!(client.id, id);
        assert_eq!(client.work_classes, vec!["Residential".to_string()]);
        assert_eq!(client.keywords_include, vec!["roof".to_string()]);
        assert_eq!(client.slider_percentage, 60);
        assert_eq!(client.priority, 2);
    }

    #[test]
    fn status_selection_filters_inactive_clients() {
        let directory = SqliteClientDirectory::open_in_memory().unwrap();
        directory
            .insert_client(&sample_client("active-co", ClientStatus::Active))
            .unwrap();
        directory
            .insert_client(&sample_client("paused-co", ClientStatus::Inactive))
            .unwrap();

        let active = directory.list_clients(&ClientSelection::active()).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "active-co");
    }

    #[test]
    fn id_selection_restricts_the_snapshot() {
        let directory = SqliteClientDirectory::open_in_memory().unwrap();
        let first = directory
            .insert_client(&sample_client("one", ClientStatus::Active))
            .unwrap();
        directory
            .insert_client(&sample_client("two", ClientStatus::Active))
            .unwrap();

        let selection = ClientSelection {
            client_ids: Some(vec![first]),
            status: None,
        };
        let clients = directory.list_clients(&selection).unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "one");
    }

    #[test]
    fn malformed_keyword_columns_load_as_empty() {
        let directory = SqliteClientDirectory::open_in_memory().unwrap();
        let id = directory
            .insert_client(&sample_client("acme", ClientStatus::Active))
            .unwrap();
        {
            let conn = directory.lock().unwrap();
            conn.execute(
                "UPDATE clients SET keywords_include = ?1, keywords_exclude = ?2 WHERE id = ?3",
                rusqlite::params!["not json", r#"["ok", null, "", 7]"#, id],
            )
            .unwrap();
        }

        let clients = directory.list_clients(&ClientSelection::default()).unwrap();
        assert!(clients[0].keywords_include.is_empty());
        assert_eq!(clients[0].keywords_exclude, vec!["ok".to_string()]);
    }

    #[test]
    fn slider_and_priority_are_clamped_into_bounds() {
        let directory = SqliteClientDirectory::open_in_memory().unwrap();
        let id = directory
            .insert_client(&sample_client("acme", ClientStatus::Active))
            .unwrap();
        {
            let conn = directory.lock().unwrap();
            conn.execute(
                "UPDATE clients SET slider_percentage = 400, priority = 0 WHERE id = ?1",
                [id],
            )
            .unwrap();
        }

        let clients = directory.list_clients(&ClientSelection::default()).unwrap();
        assert_eq!(clients[0].slider_percentage, 100);
        assert_eq!(clients[0].priority, 1);
    }
}
