//! Allocation within one contention group.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use matcher::{ClientAssignment, ResultSets};
use retrieval::ScoredPermit;
use tracing::debug;

/// Score assumed for a surfaced permit that carries no score (a client
/// matched with an empty query). Keeps unscored rows competitive without
/// dominating scored ones.
const DEFAULT_SURFACED_SCORE: f32 = 0.5;

/// Single-client group: only the slider cap applies.
///
/// The first `floor(slider% x |semantic|)` rows survive, minus anything
/// already assigned globally; survivors are marked assigned.
pub(crate) fn single_client(
    assignment: &ClientAssignment,
    finals: &mut BTreeMap<i64, ClientAssignment>,
    global_assigned: &mut HashSet<i64>,
) {
    let semantic = &assignment.sets.semantic;
    let allowed = assignment.client.slider_percentage as usize * semantic.len() / 100;

    let mut kept: Vec<ScoredPermit> = Vec::with_capacity(allowed);
    for hit in semantic.iter().take(allowed) {
        if global_assigned.insert(hit.permit.id) {
            kept.push(hit.clone());
        }
    }
    debug!(
        client_id = assignment.client.id,
        allowed,
        kept = kept.len(),
        "single-client allocation"
    );
    finals.insert(
        assignment.client.id,
        with_semantic(assignment, kept),
    );
}

/// Competing group: proportional allocation by declared demand, permits
/// ranked by average score, assigned round-robin in priority order.
pub(crate) fn competing_group(
    raw: &BTreeMap<i64, ClientAssignment>,
    members: &[i64],
    finals: &mut BTreeMap<i64, ClientAssignment>,
    global_assigned: &mut HashSet<i64>,
) {
    // Union of not-yet-assigned candidates, plus each member's score for
    // every permit it surfaced.
    let mut pool: BTreeMap<i64, ScoredPermit> = BTreeMap::new();
    let mut surfaced: HashMap<i64, HashMap<i64, f32>> = HashMap::new();
    for &client_id in members {
        let Some(assignment) = raw.get(&client_id) else {
            continue;
        };
        let scores = surfaced.entry(client_id).or_default();
        for hit in &assignment.sets.semantic {
            let permit_id = hit.permit.id;
            if global_assigned.contains(&permit_id) {
                continue;
            }
            pool.entry(permit_id).or_insert_with(|| hit.clone());
            scores.insert(permit_id, hit.score.unwrap_or(DEFAULT_SURFACED_SCORE));
        }
    }

    if pool.is_empty() {
        for &client_id in members {
            if let Some(assignment) = raw.get(&client_id) {
                finals.insert(client_id, with_semantic(assignment, Vec::new()));
            }
        }
        return;
    }

    // Proportional allocation: at least one permit for any member with
    // declared demand while the union is non-empty.
    let total_demand: u64 = members
        .iter()
        .filter_map(|id| raw.get(id))
        .map(|a| a.client.slider_percentage as u64)
        .sum();
    let mut allocations: BTreeMap<i64, usize> = BTreeMap::new();
    for &client_id in members {
        let Some(assignment) = raw.get(&client_id) else {
            continue;
        };
        let slider = assignment.client.slider_percentage as u64;
        let allocated = if slider == 0 || total_demand == 0 {
            0
        } else {
            ((slider * pool.len() as u64 / total_demand) as usize).max(1)
        };
        allocations.insert(client_id, allocated);
        debug!(client_id, slider, allocated, "group allocation");
    }

    // Rank the union by average score across the group; members that did
    // not surface a permit contribute zero. Ties break on permit id.
    let mut rankings: Vec<(f32, i64)> = pool
        .keys()
        .map(|&permit_id| {
            let sum: f32 = members
                .iter()
                .map(|cid| {
                    surfaced
                        .get(cid)
                        .and_then(|scores| scores.get(&permit_id))
                        .copied()
                        .unwrap_or(0.0)
                })
                .sum();
            (sum / members.len() as f32, permit_id)
        })
        .collect();
    rankings.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    // Round-robin in priority order (ties on client id).
    let mut order: Vec<i64> = members.to_vec();
    order.sort_by_key(|id| {
        raw.get(id)
            .map(|a| (a.client.priority, a.client.id))
            .unwrap_or((u32::MAX, *id))
    });

    let mut taken: BTreeMap<i64, Vec<ScoredPermit>> =
        members.iter().map(|id| (*id, Vec::new())).collect();
    let mut cursor = 0usize;
    while cursor < rankings.len()
        && order.iter().any(|id| {
            taken.get(id).map(Vec::len).unwrap_or(0) < allocations.get(id).copied().unwrap_or(0)
        })
    {
        for &client_id in &order {
            if cursor >= rankings.len() {
                break;
            }
            let quota = allocations.get(&client_id).copied().unwrap_or(0);
            let Some(assigned) = taken.get_mut(&client_id) else {
                continue;
            };
            if assigned.len() < quota {
                let (_, permit_id) = rankings[cursor];
                cursor += 1;
                if let Some(hit) = pool.get(&permit_id) {
                    global_assigned.insert(permit_id);
                    assigned.push(hit.clone());
                }
            }
        }
    }

    for &client_id in members {
        if let Some(assignment) = raw.get(&client_id) {
            let semantic = taken.remove(&client_id).unwrap_or_default();
            debug!(client_id, assigned = semantic.len(), "group assignment");
            finals.insert(client_id, with_semantic(assignment, semantic));
        }
    }
}

/// Final assignment: inclusion and exclusion sets pass through untouched;
/// only the semantic set is subject to contention.
fn with_semantic(assignment: &ClientAssignment, semantic: Vec<ScoredPermit>) -> ClientAssignment {
    ClientAssignment {
        client: assignment.client.clone(),
        sets: ResultSets {
            inclusion: assignment.sets.inclusion.clone(),
            exclusion: assignment.sets.exclusion.clone(),
            semantic,
        },
    }
}
