use std::sync::Arc;

use index::EmbeddingIndex;
use ingest::Permit;
use retrieval::{rank_within_pool, ScoredPermit};
use store::{PermitFilter, PermitStore};
use tracing::{debug, info};

use crate::keywords::{first_matching_keyword, whole_word_match};
use crate::types::{ClientProfile, MatchError, MatchOverrides, ExcludedPermit, ResultSets};

/// Query used when a client declares no semantic preference at all.
const DEFAULT_QUERY: &str = "construction permit";

/// Matcher tuning.
#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    /// Upper bound on the structural candidate pool per client.
    pub pool_limit: usize,
    /// Cap on the semantic result set handed to the resolver.
    pub per_client_top_k: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            pool_limit: 1000,
            per_client_top_k: 200,
        }
    }
}

/// Per-client sequential matching pipeline:
/// structural filter → inclusion keywords → exclusion keywords → semantic
/// ranking, producing the three result sets.
pub struct ClientMatcher {
    store: PermitStore,
    index: Arc<EmbeddingIndex>,
    settings: MatchSettings,
}

impl ClientMatcher {
    pub fn new(store: PermitStore, index: Arc<EmbeddingIndex>, settings: MatchSettings) -> Self {
        Self {
            store,
            index,
            settings,
        }
    }

    /// Run the four stages for one client.
    pub fn match_client(
        &self,
        client: &ClientProfile,
        overrides: &MatchOverrides,
    ) -> Result<ResultSets, MatchError> {
        let span = tracing::info_span!("match_client", client_id = client.id);
        let _guard = span.enter();

        // Stage 1: structural candidate pool.
        let filter = build_filter(client, overrides);
        let pool = self.store.query_filtered(&filter, self.settings.pool_limit)?;
        debug!(pool = pool.len(), "structural filter");

        let (keywords_include, keywords_exclude) = determine_keywords(client, overrides);

        // Stage 2: inclusion keywords (OR, whole word); pass-through when
        // the client declares none.
        let inclusion: Vec<Permit> = if keywords_include.is_empty() {
            pool
        } else {
            pool.into_iter()
                .filter(|p| {
                    keywords_include
                        .iter()
                        .any(|kw| whole_word_match(&p.description, kw))
                })
                .collect()
        };
        debug!(inclusion = inclusion.len(), "inclusion filter");

        // Stage 3: exclusion keywords partition the inclusion set. Removed
        // rows are kept, with a reason, as the audit result set.
        let mut cleaned: Vec<Permit> = Vec::with_capacity(inclusion.len());
        let mut exclusion: Vec<ExcludedPermit> = Vec::new();
        if keywords_exclude.is_empty() {
            cleaned = inclusion.clone();
        } else {
            for permit in &inclusion {
                match first_matching_keyword(&permit.description, &keywords_exclude) {
                    Some(keyword) => exclusion.push(ExcludedPermit {
                        permit: permit.clone(),
                        reason: format!("contained keyword '{keyword}'"),
                    }),
                    None => cleaned.push(permit.clone()),
                }
            }
        }
        debug!(
            cleaned = cleaned.len(),
            excluded = exclusion.len(),
            "exclusion filter"
        );

        // Stage 4: semantic ranking of the cleaned set.
        let top_k = overrides
            .per_client_top_k
            .unwrap_or(self.settings.per_client_top_k);
        let query = determine_query(client, overrides);
        let semantic: Vec<ScoredPermit> = if cleaned.is_empty() {
            Vec::new()
        } else if query.is_empty() {
            cleaned
                .iter()
                .take(top_k)
                .cloned()
                .map(ScoredPermit::unscored)
                .collect()
        } else {
            rank_within_pool(&self.index, cleaned, &query, top_k, true)
        };

        info!(
            inclusion = inclusion.len(),
            exclusion = exclusion.len(),
            semantic = semantic.len(),
            query = %query,
            "client matched"
        );
        Ok(ResultSets {
            inclusion,
            exclusion,
            semantic,
        })
    }
}

/// Stage-1 filter: the client's structural preferences, with any non-empty
/// override field replacing the client's own.
fn build_filter(client: &ClientProfile, overrides: &MatchOverrides) -> PermitFilter {
    let mut filter = PermitFilter::default();

    if let Some(city) = non_empty(&client.city) {
        filter.city = vec![city];
    }
    if let Some(permit_type) = non_empty(&client.permit_type) {
        filter.permit_type = vec![permit_type];
    }
    if let Some(class) = non_empty(&client.permit_class_mapped) {
        filter.permit_class_mapped = vec![class];
    }
    let work_classes: Vec<String> = client
        .work_classes
        .iter()
        .filter(|wc| !wc.trim().is_empty())
        .cloned()
        .collect();
    if !work_classes.is_empty() {
        filter.work_class = work_classes;
    }

    if let Some(over) = &overrides.filter {
        if !over.city.is_empty() {
            filter.city = over.city.clone();
        }
        if !over.permit_type.is_empty() {
            filter.permit_type = over.permit_type.clone();
        }
        if !over.permit_class_mapped.is_empty() {
            filter.permit_class_mapped = over.permit_class_mapped.clone();
        }
        if !over.work_class.is_empty() {
            filter.work_class = over.work_class.clone();
        }
        if !over.current_status.is_empty() {
            filter.current_status = over.current_status.clone();
        }
        filter.issued_date_from = over.issued_date_from.or(filter.issued_date_from);
        filter.issued_date_to = over.issued_date_to.or(filter.issued_date_to);
        filter.applied_date_from = over.applied_date_from.or(filter.applied_date_from);
        filter.applied_date_to = over.applied_date_to.or(filter.applied_date_to);
    }

    filter
}

/// Query resolution order: request override (verbatim, possibly empty) →
/// client's saved query → inferred from structural preferences → the
/// default query.
fn determine_query(client: &ClientProfile, overrides: &MatchOverrides) -> String {
    if let Some(query) = &overrides.query {
        return query.trim().to_string();
    }
    if overrides.use_client_prefs {
        if let Some(query) = &client.rag_query {
            let query = query.trim();
            if !query.is_empty() {
                return query.to_string();
            }
        }
    }
    inferred_query(client)
}

fn inferred_query(client: &ClientProfile) -> String {
    let parts: Vec<String> = [
        &client.permit_class_mapped,
        &client.permit_type,
        &client.city,
    ]
    .into_iter()
    .filter_map(non_empty)
    .collect();

    if parts.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        parts.join(" ")
    }
}

fn determine_keywords(
    client: &ClientProfile,
    overrides: &MatchOverrides,
) -> (Vec<String>, Vec<String>) {
    if overrides.keywords_include.is_some() || overrides.keywords_exclude.is_some() {
        return (
            overrides.keywords_include.clone().unwrap_or_default(),
            overrides.keywords_exclude.clone().unwrap_or_default(),
        );
    }
    if overrides.use_client_prefs {
        return (
            client.keywords_include.clone(),
            client.keywords_exclude.clone(),
        );
    }
    (Vec::new(), Vec::new())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
