use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw permit record as returned by a city scraper.
///
/// Sources publish under heterogeneous column names and value shapes, so the
/// raw record is an untyped key/value map. [`crate::normalize_rows`] is the
/// only consumer; everything past the ingest boundary works with [`Permit`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawPermit {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawPermit {
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    /// Set a field, replacing any previous value under the same key.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// First non-empty value among `keys`, rendered as a trimmed string.
    ///
    /// Numbers are accepted (some sources publish permit numbers and phones
    /// as JSON numbers); null, arrays, and objects are ignored.
    pub fn first(&self, keys: &[&str]) -> Option<String> {
        for key in keys {
            let text = match self.fields.get(*key) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            if !text.is_empty() {
                return Some(text);
            }
        }
        None
    }
}

/// Canonical permit record prior to insertion (no surrogate id yet).
///
/// Produced by [`crate::normalize_rows`]; consumed by the permit store,
/// which assigns `id` and `created_at` on insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewPermit {
    pub city: String,
    pub permit_number: String,
    pub permit_type: Option<String>,
    pub permit_class_mapped: Option<String>,
    pub work_class: Option<String>,
    pub current_status: Option<String>,
    /// Primary semantic signal. May be empty, never missing.
    pub description: String,
    pub applied_date: Option<NaiveDate>,
    pub issued_date: Option<NaiveDate>,
    pub applicant_name: Option<String>,
    pub applicant_address: Option<String>,
    pub applicant_phone: Option<String>,
    pub contractor_name: Option<String>,
    pub contractor_company_name: Option<String>,
    pub contractor_phone: Option<String>,
    pub contractor_address: Option<String>,
}

/// Canonical permit record as stored. Immutable once inserted.
///
/// `(city, permit_number)` is globally unique; `id` is a strictly
/// increasing surrogate assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Permit {
    pub id: i64,
    pub city: String,
    pub permit_number: String,
    pub permit_type: Option<String>,
    pub permit_class_mapped: Option<String>,
    pub work_class: Option<String>,
    pub current_status: Option<String>,
    pub description: String,
    pub applied_date: Option<NaiveDate>,
    pub issued_date: Option<NaiveDate>,
    pub applicant_name: Option<String>,
    pub applicant_address: Option<String>,
    pub applicant_phone: Option<String>,
    pub contractor_name: Option<String>,
    pub contractor_company_name: Option<String>,
    pub contractor_phone: Option<String>,
    pub contractor_address: Option<String>,
    pub created_at: DateTime<Utc>,
}
