//! Contact phone selection and formatting.

use ingest::Permit;

/// Normalize a raw phone value to `(xxx) xxx-xxxx`.
///
/// Ten digits format directly; eleven digits with a leading country `1`
/// drop it; anything else is reduced to its digits (empty when none).
pub fn format_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => {
            format!("({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        _ => digits,
    }
}

/// Best available contact phone for a permit, formatted. Contractor-side
/// first, applicant second; raw ingest already coalesced the source's
/// generic phone columns onto these two fields.
pub fn best_phone(permit: &Permit) -> Option<String> {
    for candidate in [&permit.contractor_phone, &permit.applicant_phone] {
        if let Some(raw) = candidate {
            if raw.trim().is_empty() {
                continue;
            }
            let formatted = format_phone(raw);
            if !formatted.is_empty() {
                return Some(formatted);
            }
        }
    }
    None
}
