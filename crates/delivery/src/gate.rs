//! The hard pre-delivery contact gate: no phone, no lead.

use matcher::ResultSets;
use tracing::debug;

use crate::phone::best_phone;

/// Drop every row, in every result set, that carries no contact phone.
///
/// Applied after ledger filtering and before handoff to the deliverer, so
/// everything a deliverer sees is guaranteed reachable.
pub fn apply_phone_gate(sets: &ResultSets) -> ResultSets {
    let gated = ResultSets {
        inclusion: sets
            .inclusion
            .iter()
            .filter(|p| best_phone(p).is_some())
            .cloned()
            .collect(),
        exclusion: sets
            .exclusion
            .iter()
            .filter(|e| best_phone(&e.permit).is_some())
            .cloned()
            .collect(),
        semantic: sets
            .semantic
            .iter()
            .filter(|s| best_phone(&s.permit).is_some())
            .cloned()
            .collect(),
    };
    debug!(
        inclusion = gated.inclusion.len(),
        exclusion = gated.exclusion.len(),
        semantic = gated.semantic.len(),
        "phone gate applied"
    );
    gated
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::Permit;
    use matcher::ExcludedPermit;
    use retrieval::ScoredPermit;

    fn permit(id: i64, phone: Option<&str>) -> Permit {
        Permit {
            id,
            city: "austin".into(),
            permit_number: format!("P-{id}"),
            permit_type: None,
            permit_class_mapped: None,
            work_class: None,
            current_status: None,
            description: String::new(),
            applied_date: None,
            issued_date: None,
            applicant_name: None,
            applicant_address: None,
            applicant_phone: None,
            contractor_name: None,
            contractor_company_name: None,
            contractor_phone: phone.map(str::to_string),
            contractor_address: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn rows_without_phone_are_dropped_from_every_set() {
        let with = permit(1, Some("5125550134"));
        let without = permit(2, None);
        let sets = ResultSets {
            inclusion: vec![with.clone(), without.clone()],
            exclusion: vec![
                ExcludedPermit {
                    permit: with.clone(),
                    reason: "contained keyword 'pool'".into(),
                },
                ExcludedPermit {
                    permit: without.clone(),
                    reason: "contained keyword 'pool'".into(),
                },
            ],
            semantic: vec![
                ScoredPermit {
                    permit: with.clone(),
                    score: Some(0.9),
                },
                ScoredPermit {
                    permit: without,
                    score: Some(0.8),
                },
            ],
        };

        let gated = apply_phone_gate(&sets);
        assert_eq!(gated.inclusion.len(), 1);
        assert_eq!(gated.exclusion.len(), 1);
        assert_eq!(gated.semantic.len(), 1);
        assert!(gated.inclusion[0].id == 1);
        assert!(gated.semantic[0].permit.id == 1);
    }

    #[test]
    fn empty_sets_stay_empty() {
        let gated = apply_phone_gate(&ResultSets::default());
        assert!(gated.inclusion.is_empty());
        assert!(gated.exclusion.is_empty());
        assert!(gated.semantic.is_empty());
    }
}
