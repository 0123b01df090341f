use ingest::normalize_value;
use matcher::ClientProfile;

/// Contention group identity: clients sharing the same normalized
/// structural preferences compete for the same underlying permit pool.
///
/// `Ord` gives groups a stable processing order, part of the resolver's
/// determinism guarantee.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub permit_type: String,
    pub permit_class_mapped: String,
    pub city: String,
    pub work_classes: Vec<String>,
}

/// Group identity for one client, under the ingest normalization policy,
/// with work classes sorted.
pub fn group_key(client: &ClientProfile) -> GroupKey {
    let norm = |value: &Option<String>| {
        value
            .as_deref()
            .map(normalize_value)
            .unwrap_or_default()
    };
    let mut work_classes: Vec<String> = client
        .work_classes
        .iter()
        .map(|wc| normalize_value(wc))
        .filter(|wc| !wc.is_empty())
        .collect();
    work_classes.sort();
    work_classes.dedup();

    GroupKey {
        permit_type: norm(&client.permit_type),
        permit_class_mapped: norm(&client.permit_class_mapped),
        city: norm(&client.city),
        work_classes,
    }
}
