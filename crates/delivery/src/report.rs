//! CSV lead report artifacts, one per result set.

use ingest::Permit;
use matcher::{ClientProfile, ResultSets};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DeliveryError;
use crate::phone::best_phone;

/// Longest description carried into a report row.
const DESCRIPTION_LIMIT: usize = 200;

const BASE_HEADER: &[&str] = &[
    "permit_id",
    "permit_number",
    "city",
    "permit_type",
    "work_class",
    "description",
    "applied_date",
    "issued_date",
    "contractor",
    "phone",
    "address",
];

/// The three report artifacts handed to a deliverer for one client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadReports {
    pub client_id: i64,
    pub client_name: String,
    pub inclusion_csv: String,
    pub exclusion_csv: String,
    pub semantic_csv: String,
    pub inclusion_rows: usize,
    pub exclusion_rows: usize,
    pub semantic_rows: usize,
}

impl LeadReports {
    pub fn total_rows(&self) -> usize {
        self.inclusion_rows + self.exclusion_rows + self.semantic_rows
    }
}

/// Render a client's result sets into the three CSV artifacts.
pub fn build_reports(
    client: &ClientProfile,
    sets: &ResultSets,
) -> Result<LeadReports, DeliveryError> {
    let inclusion_csv = render_csv(
        sets.inclusion.iter().map(|p| (p, None, None)),
        ReportShape::Plain,
    )?;
    let exclusion_csv = render_csv(
        sets.exclusion
            .iter()
            .map(|e| (&e.permit, None, Some(e.reason.as_str()))),
        ReportShape::WithReason,
    )?;
    let semantic_csv = render_csv(
        sets.semantic.iter().map(|s| (&s.permit, s.score, None)),
        ReportShape::WithScore,
    )?;

    let reports = LeadReports {
        client_id: client.id,
        client_name: client.name.clone(),
        inclusion_csv,
        exclusion_csv,
        semantic_csv,
        inclusion_rows: sets.inclusion.len(),
        exclusion_rows: sets.exclusion.len(),
        semantic_rows: sets.semantic.len(),
    };
    debug!(
        client_id = client.id,
        inclusion = reports.inclusion_rows,
        exclusion = reports.exclusion_rows,
        semantic = reports.semantic_rows,
        "built lead reports"
    );
    Ok(reports)
}

#[derive(Clone, Copy, PartialEq)]
enum ReportShape {
    Plain,
    WithScore,
    WithReason,
}

fn render_csv<'a, I>(rows: I, shape: ReportShape) -> Result<String, DeliveryError>
where
    I: Iterator<Item = (&'a Permit, Option<f32>, Option<&'a str>)>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header: Vec<&str> = BASE_HEADER.to_vec();
    match shape {
        ReportShape::Plain => {}
        ReportShape::WithScore => header.push("score"),
        ReportShape::WithReason => header.push("reason"),
    }
    writer.write_record(&header).map_err(report_err)?;

    for (permit, score, reason) in rows {
        let mut record: Vec<String> = vec![
            permit.id.to_string(),
            permit.permit_number.clone(),
            permit.city.clone(),
            permit.permit_type.clone().unwrap_or_default(),
            permit.work_class.clone().unwrap_or_default(),
            truncate(&permit.description, DESCRIPTION_LIMIT),
            format_date(permit.applied_date),
            format_date(permit.issued_date),
            contractor_label(permit),
            best_phone(permit).unwrap_or_default(),
            permit.contractor_address.clone().unwrap_or_default(),
        ];
        match shape {
            ReportShape::Plain => {}
            ReportShape::WithScore => {
                record.push(score.map(|s| format!("{s:.4}")).unwrap_or_default());
            }
            ReportShape::WithReason => {
                record.push(reason.unwrap_or_default().to_string());
            }
        }
        writer.write_record(&record).map_err(report_err)?;
    }

    let bytes = writer.into_inner().map_err(report_err)?;
    String::from_utf8(bytes).map_err(report_err)
}

fn contractor_label(permit: &Permit) -> String {
    permit
        .contractor_company_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .or_else(|| permit.contractor_name.clone())
        .unwrap_or_default()
}

fn format_date(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(limit).collect();
    shortened.push_str("...");
    shortened
}

fn report_err<E: std::fmt::Display>(err: E) -> DeliveryError {
    DeliveryError::Report(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use matcher::ExcludedPermit;
    use retrieval::ScoredPermit;

    fn permit(id: i64, description: &str) -> Permit {
        Permit {
            id,
            city: "austin".into(),
            permit_number: format!("P-{id}"),
            permit_type: Some("Building".into()),
            permit_class_mapped: Some("Residential".into()),
            work_class: Some("Remodel".into()),
            current_status: Some("Issued".into()),
            description: description.into(),
            applied_date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
            issued_date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
            applicant_name: None,
            applicant_address: None,
            applicant_phone: None,
            contractor_name: Some("Jo Builder".into()),
            contractor_company_name: Some("Builder Co".into()),
            contractor_phone: Some("5125550134".into()),
            contractor_address: Some("100 Main St".into()),
            created_at: chrono::Utc::now(),
        }
    }

    fn client() -> ClientProfile {
        ClientProfile {
            id: 7,
            name: "Roofline".into(),
            ..Default::default()
        }
    }

    #[test]
    fn three_artifacts_with_matching_counts() {
        let sets = ResultSets {
            inclusion: vec![permit(1, "roof work"), permit(2, "deck work")],
            exclusion: vec![ExcludedPermit {
                permit: permit(3, "pool deck work"),
                reason: "contained keyword 'pool deck'".into(),
            }],
            semantic: vec![ScoredPermit {
                permit: permit(1, "roof work"),
                score: Some(0.8123),
            }],
        };

        let reports = build_reports(&client(), &sets).unwrap();
        assert_eq!(reports.inclusion_rows, 2);
        assert_eq!(reports.exclusion_rows, 1);
        assert_eq!(reports.semantic_rows, 1);
        assert_eq!(reports.total_rows(), 4);

        // Row counts in the CSVs themselves (header + data lines).
        assert_eq!(reports.inclusion_csv.lines().count(), 3);
        assert_eq!(reports.exclusion_csv.lines().count(), 2);
        assert_eq!(reports.semantic_csv.lines().count(), 2);
    }

    #[test]
    fn semantic_report_carries_scores() {
        let sets = ResultSets {
            semantic: vec![ScoredPermit {
                permit: permit(1, "roof"),
                score: Some(0.8123),
            }],
            ..Default::default()
        };
        let reports = build_reports(&client(), &sets).unwrap();
        assert!(reports.semantic_csv.lines().next().unwrap().ends_with("score"));
        assert!(reports.semantic_csv.contains("0.8123"));
    }

    #[test]
    fn exclusion_report_carries_reasons() {
        let sets = ResultSets {
            exclusion: vec![ExcludedPermit {
                permit: permit(1, "pool deck"),
                reason: "contained keyword 'pool deck'".into(),
            }],
            ..Default::default()
        };
        let reports = build_reports(&client(), &sets).unwrap();
        assert!(reports.exclusion_csv.contains("contained keyword 'pool deck'"));
    }

    #[test]
    fn descriptions_with_commas_are_quoted() {
        let sets = ResultSets {
            inclusion: vec![permit(1, "demo, rebuild, and finish out")],
            ..Default::default()
        };
        let reports = build_reports(&client(), &sets).unwrap();
        assert!(reports
            .inclusion_csv
            .contains("\"demo, rebuild, and finish out\""));
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let long = "x".repeat(500);
        let sets = ResultSets {
            inclusion: vec![permit(1, &long)],
            ..Default::default()
        };
        let reports = build_reports(&client(), &sets).unwrap();
        assert!(reports.inclusion_csv.contains(&"x".repeat(200)));
        assert!(!reports.inclusion_csv.contains(&"x".repeat(201)));
    }

    #[test]
    fn formatted_phone_and_company_name_appear() {
        let sets = ResultSets {
            inclusion: vec![permit(1, "roof")],
            ..Default::default()
        };
        let reports = build_reports(&client(), &sets).unwrap();
        assert!(reports.inclusion_csv.contains("(512) 555-0134"));
        assert!(reports.inclusion_csv.contains("Builder Co"));
    }
}
