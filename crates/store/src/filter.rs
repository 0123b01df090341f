use chrono::NaiveDate;
use ingest::normalize_value;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

/// Structured equality + date-range filter over the permit catalog.
///
/// List-valued fields use OR semantics within the field and AND semantics
/// across fields. Values are compared under the ingest normalization
/// policy, applied to both sides (the store registers the same policy as a
/// SQL scalar function).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PermitFilter {
    #[serde(default)]
    pub city: Vec<String>,
    #[serde(default)]
    pub permit_type: Vec<String>,
    #[serde(default)]
    pub permit_class_mapped: Vec<String>,
    #[serde(default)]
    pub work_class: Vec<String>,
    #[serde(default)]
    pub current_status: Vec<String>,
    #[serde(default)]
    pub issued_date_from: Option<NaiveDate>,
    #[serde(default)]
    pub issued_date_to: Option<NaiveDate>,
    #[serde(default)]
    pub applied_date_from: Option<NaiveDate>,
    #[serde(default)]
    pub applied_date_to: Option<NaiveDate>,
}

impl PermitFilter {
    /// True when no predicate is set at all.
    pub fn is_empty(&self) -> bool {
        self.city.is_empty()
            && self.permit_type.is_empty()
            && self.permit_class_mapped.is_empty()
            && self.work_class.is_empty()
            && self.current_status.is_empty()
            && self.issued_date_from.is_none()
            && self.issued_date_to.is_none()
            && self.applied_date_from.is_none()
            && self.applied_date_to.is_none()
    }

    /// Render the filter as SQL predicate fragments plus bound parameters.
    ///
    /// Fragments start with `AND ...` and compose onto a `WHERE 1=1` base.
    pub(crate) fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut sql = String::new();
        let mut params: Vec<SqlValue> = Vec::new();

        push_in_clause(&mut sql, &mut params, "city", &self.city);
        push_in_clause(&mut sql, &mut params, "permit_type", &self.permit_type);
        push_in_clause(
            &mut sql,
            &mut params,
            "permit_class_mapped",
            &self.permit_class_mapped,
        );
        push_in_clause(&mut sql, &mut params, "work_class", &self.work_class);
        push_in_clause(&mut sql, &mut params, "current_status", &self.current_status);

        push_date_bound(&mut sql, &mut params, "issued_date >= ?", self.issued_date_from);
        push_date_bound(&mut sql, &mut params, "issued_date <= ?", self.issued_date_to);
        push_date_bound(&mut sql, &mut params, "applied_date >= ?", self.applied_date_from);
        push_date_bound(&mut sql, &mut params, "applied_date <= ?", self.applied_date_to);

        (sql, params)
    }
}

fn push_in_clause(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    column: &str,
    values: &[String],
) {
    let cleaned: Vec<&String> = values.iter().filter(|v| !v.trim().is_empty()).collect();
    if cleaned.is_empty() {
        return;
    }
    let placeholders = vec!["?"; cleaned.len()].join(",");
    sql.push_str(&format!(" AND permit_norm({column}) IN ({placeholders})"));
    for value in cleaned {
        params.push(SqlValue::Text(normalize_value(value)));
    }
}

fn push_date_bound(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    predicate: &str,
    bound: Option<NaiveDate>,
) {
    if let Some(date) = bound {
        sql.push_str(" AND ");
        sql.push_str(predicate);
        params.push(SqlValue::Text(date.format("%Y-%m-%d").to_string()));
    }
}
