//! Permitflow Resolver
//!
//! Takes every client's matched output and produces final per-client
//! Semantic Result Sets such that no permit lands with more than one
//! client in a cycle.
//!
//! Clients are partitioned into contention groups by their normalized
//! structural preferences ([`group::group_key`]). A group of one only has
//! its demand slider applied; competing groups get a proportional
//! allocation of the group's candidate union, ranked by average score and
//! dealt round-robin in priority order ([`allocate`]). One global
//! assigned-set spans all groups.
//!
//! The whole pass is deterministic for a fixed input: groups process in
//! key order, score ties break on ascending permit id, priority ties on
//! ascending client id. A post-condition sweep re-checks exclusivity and
//! fails the cycle rather than ever shipping a double-assigned permit.
//!
//! Inclusion and Exclusion Result Sets are per-client audit artifacts and
//! pass through contention untouched.

mod allocate;
mod group;

pub use crate::group::{group_key, GroupKey};

use std::collections::{BTreeMap, HashSet};

use matcher::ClientAssignment;
use thiserror::Error;
use tracing::info;

/// Raw (pre-contention) or final (post-contention) assignments, keyed by
/// client id.
pub type Assignments = BTreeMap<i64, ClientAssignment>;

/// Errors surfaced by contention resolution. Fatal to the cycle: nothing
/// is delivered and no ledger rows are written.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("permit {permit_id} assigned to more than one client")]
    ExclusivityViolation { permit_id: i64 },
}

/// Resolve contention across all clients' raw assignments.
pub fn resolve(raw: &Assignments) -> Result<Assignments, ResolveError> {
    let mut groups: BTreeMap<GroupKey, Vec<i64>> = BTreeMap::new();
    for (client_id, assignment) in raw {
        groups
            .entry(group_key(&assignment.client))
            .or_default()
            .push(*client_id);
    }

    let mut finals: Assignments = BTreeMap::new();
    let mut global_assigned: HashSet<i64> = HashSet::new();

    for (key, members) in &groups {
        if members.len() == 1 {
            if let Some(assignment) = raw.get(&members[0]) {
                allocate::single_client(assignment, &mut finals, &mut global_assigned);
            }
        } else {
            info!(
                clients = members.len(),
                city = %key.city,
                permit_type = %key.permit_type,
                "resolving competing group"
            );
            allocate::competing_group(raw, members, &mut finals, &mut global_assigned);
        }
    }

    check_exclusivity(&finals)?;
    Ok(finals)
}

fn check_exclusivity(finals: &Assignments) -> Result<(), ResolveError> {
    let mut seen: HashSet<i64> = HashSet::new();
    for assignment in finals.values() {
        for hit in &assignment.sets.semantic {
            if !seen.insert(hit.permit.id) {
                return Err(ResolveError::ExclusivityViolation {
                    permit_id: hit.permit.id,
                });
            }
        }
    }
    Ok(())
}
