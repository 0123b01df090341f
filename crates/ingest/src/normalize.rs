use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::permit::{NewPermit, RawPermit};

// Alias tables for the column names observed across municipal sources.
// Order matters: earlier keys win when a source publishes several.
const PERMIT_NUMBER_KEYS: &[&str] = &[
    "permit_number",
    "permit_num",
    "Permit Num",
    "Permit Number",
    "PermitNum",
];
const PERMIT_TYPE_KEYS: &[&str] = &["permit_type", "Permit Type Desc", "Permit Type"];
const PERMIT_CLASS_KEYS: &[&str] = &["permit_class_mapped", "Permit Class Mapped"];
const WORK_CLASS_KEYS: &[&str] = &["work_class", "Work Class"];
const STATUS_KEYS: &[&str] = &["current_status", "Status Current", "status"];
const DESCRIPTION_KEYS: &[&str] = &["description", "Description"];
const APPLIED_DATE_KEYS: &[&str] = &["applied_date", "Applied Date"];
const ISSUED_DATE_KEYS: &[&str] = &["issued_date", "Issued Date"];
const APPLICANT_NAME_KEYS: &[&str] = &["applicant_name", "Applicant Name"];
const APPLICANT_ADDRESS_KEYS: &[&str] = &["applicant_address", "Applicant Address"];
const CONTRACTOR_NAME_KEYS: &[&str] = &["contractor_name", "Contractor Name"];
const CONTRACTOR_COMPANY_KEYS: &[&str] = &[
    "contractor_company_name",
    "Contractor Company Name",
];
const CONTRACTOR_ADDRESS_KEYS: &[&str] = &["contractor_address", "Contractor Address"];

// Contact coalescing: contractor-side keys first, then the generic ones
// some sources use. Applicant phones stay on the applicant field.
const CONTRACTOR_PHONE_KEYS: &[&str] = &[
    "contractor_phone",
    "Contractor Phone",
    "phone",
    "contact_phone",
    "business_phone",
    "company_phone",
    "contractor_company_phone",
];
const APPLICANT_PHONE_KEYS: &[&str] = &["applicant_phone", "Applicant Phone"];

/// The single value-normalization policy used for filter comparison.
///
/// Applied uniformly to stored values and query values: lowercase, trim,
/// whitespace collapse, spaced dashes tightened, ampersands spelled out.
pub fn normalize_value(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let lowered = collapsed.to_lowercase();
    let dashed = lowered
        .replace(" - ", "-")
        .replace("- ", "-")
        .replace(" -", "-");
    dashed.replace(" & ", " and ").replace('&', "and")
}

/// Parse a permit date as published by the sources.
///
/// Accepts `YYYY-MM-DD` (optionally with a trailing time component) and the
/// `MM/DD/YYYY` form some portals export.
pub fn parse_permit_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.len() >= 10 {
        if let Ok(date) = NaiveDate::parse_from_str(&trimmed[..10], "%Y-%m-%d") {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").ok()
}

/// Map one raw row onto the canonical field set.
///
/// Returns `None` when the row lacks a permit number; `(city,
/// permit_number)` is the record identity and such rows cannot be stored.
pub fn normalize_row(city: &str, raw: &RawPermit) -> Option<NewPermit> {
    let permit_number = raw.first(PERMIT_NUMBER_KEYS)?;

    Some(NewPermit {
        city: city.trim().to_string(),
        permit_number,
        permit_type: raw.first(PERMIT_TYPE_KEYS),
        permit_class_mapped: raw.first(PERMIT_CLASS_KEYS),
        work_class: raw.first(WORK_CLASS_KEYS),
        current_status: raw.first(STATUS_KEYS),
        description: raw.first(DESCRIPTION_KEYS).unwrap_or_default(),
        applied_date: raw
            .first(APPLIED_DATE_KEYS)
            .and_then(|d| parse_permit_date(&d)),
        issued_date: raw
            .first(ISSUED_DATE_KEYS)
            .and_then(|d| parse_permit_date(&d)),
        applicant_name: raw.first(APPLICANT_NAME_KEYS),
        applicant_address: raw.first(APPLICANT_ADDRESS_KEYS),
        applicant_phone: raw.first(APPLICANT_PHONE_KEYS),
        contractor_name: raw.first(CONTRACTOR_NAME_KEYS),
        contractor_company_name: raw.first(CONTRACTOR_COMPANY_KEYS),
        contractor_phone: raw.first(CONTRACTOR_PHONE_KEYS),
        contractor_address: raw.first(CONTRACTOR_ADDRESS_KEYS),
    })
}

/// Map a scraped batch onto canonical records, dropping rows without a
/// permit number.
pub fn normalize_rows(city: &str, rows: &[RawPermit]) -> Vec<NewPermit> {
    let mut normalized = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for raw in rows {
        match normalize_row(city, raw) {
            Some(permit) => normalized.push(permit),
            None => {
                dropped += 1;
                debug!(city, "dropping row without permit number");
            }
        }
    }

    if dropped > 0 {
        warn!(city, dropped, kept = normalized.len(), "normalize_rows dropped rows");
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_value_policy() {
        assert_eq!(normalize_value("  Commercial  - Remodel "), "commercial-remodel");
        assert_eq!(normalize_value("Bath & Kitchen"), "bath and kitchen");
        assert_eq!(normalize_value("R&R"), "randr");
        assert_eq!(normalize_value("ROOFING\t\n work"), "roofing work");
    }

    #[test]
    fn parse_dates_both_forms() {
        assert_eq!(
            parse_permit_date("2024-03-05"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            parse_permit_date("2024-03-05T00:00:00.000"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            parse_permit_date("03/05/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(parse_permit_date("next tuesday"), None);
    }

    #[test]
    fn normalize_row_maps_source_aliases() {
        let mut raw = RawPermit::new();
        raw.set("Permit Num", "2024-000812");
        raw.set("Permit Type Desc", "Building Permit");
        raw.set("Work Class", "Residential");
        raw.set("Description", "detached garage addition");
        raw.set("Issued Date", "2024-06-01T00:00:00.000");
        raw.set("Contractor Phone", "(303) 555-0164");

        let permit = normalize_row("denver", &raw).unwrap();
        assert_eq!(permit.city, "denver");
        assert_eq!(permit.permit_number, "2024-000812");
        assert_eq!(permit.permit_type.as_deref(), Some("Building Permit"));
        assert_eq!(permit.issued_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(permit.contractor_phone.as_deref(), Some("(303) 555-0164"));
    }

    #[test]
    fn generic_phone_keys_coalesce_to_contractor() {
        let mut raw = RawPermit::new();
        raw.set("permit_number", "X-1");
        raw.set("business_phone", "720 555 0100");

        let permit = normalize_row("denver", &raw).unwrap();
        assert_eq!(permit.contractor_phone.as_deref(), Some("720 555 0100"));
        assert_eq!(permit.applicant_phone, None);
    }

    #[test]
    fn rows_without_permit_number_are_dropped() {
        let mut keeper = RawPermit::new();
        keeper.set("permit_number", "A-1");
        let mut dropped = RawPermit::new();
        dropped.set("Description", "no identity");

        let rows = normalize_rows("austin", &[keeper, dropped]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].permit_number, "A-1");
    }

    #[test]
    fn missing_description_becomes_empty_string() {
        let mut raw = RawPermit::new();
        raw.set("permit_number", "A-2");

        let permit = normalize_row("austin", &raw).unwrap();
        assert_eq!(permit.description, "");
    }
}
