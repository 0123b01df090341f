//! Permitflow Retrieval
//!
//! One entry point over three retrieval modes:
//!
//! - **Keyword** — case-insensitive substring match on the description
//!   over the filtered pool, most recent first.
//! - **Semantic** — structured pre-filter, then cosine ranking of the
//!   candidate pool against the embedding index. Candidates the index does
//!   not know are excluded; an unloaded or badly stale index falls back to
//!   whole-word text scoring (see [`rank`]).
//! - **Dual** — both of the above, produced independently, no
//!   deduplication between them; downstream treats them as distinct
//!   reports.
//!
//! Pool sizing for the semantic mode oversamples the database so the
//! ranker has room to work: `max(top_k × oversample, 1000)` when filters
//! are present, `max(top_k × 3, 500)` otherwise.

mod error;
pub mod rank;

pub use crate::error::RetrievalError;
pub use crate::rank::{rank_within_pool, text_score_fallback, ScoredPermit};

use std::sync::Arc;

use index::EmbeddingIndex;
use serde::{Deserialize, Serialize};
use store::{PermitFilter, PermitStore};
use tracing::debug;

/// Retrieval mode selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    #[default]
    Semantic,
    Dual,
}

/// One unified search request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    #[serde(default)]
    pub filter: PermitFilter,
    pub top_k: usize,
    pub oversample: usize,
    pub return_scores: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            mode: SearchMode::Semantic,
            filter: PermitFilter::default(),
            top_k: 20,
            oversample: 5,
            return_scores: true,
        }
    }
}

/// Result sets per mode. Single-mode requests leave the other side empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub keyword: Vec<ScoredPermit>,
    pub semantic: Vec<ScoredPermit>,
}

/// Hybrid searcher over the catalog and the embedding index.
#[derive(Clone)]
pub struct Searcher {
    store: PermitStore,
    index: Arc<EmbeddingIndex>,
}

impl Searcher {
    pub fn new(store: PermitStore, index: Arc<EmbeddingIndex>) -> Self {
        Self { store, index }
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Run one request in the selected mode.
    pub fn unified_search(&self, req: &SearchRequest) -> Result<SearchResponse, RetrievalError> {
        let mut response = SearchResponse::default();
        match req.mode {
            SearchMode::Keyword => {
                response.keyword = self.search_keyword(&req.query, &req.filter, req.top_k)?;
            }
            SearchMode::Semantic => {
                response.semantic = self.search_semantic(
                    &req.query,
                    &req.filter,
                    req.top_k,
                    req.oversample,
                    req.return_scores,
                )?;
            }
            SearchMode::Dual => {
                response.keyword = self.search_keyword(&req.query, &req.filter, req.top_k)?;
                response.semantic = self.search_semantic(
                    &req.query,
                    &req.filter,
                    req.top_k,
                    req.oversample,
                    req.return_scores,
                )?;
            }
        }
        debug!(
            keyword = response.keyword.len(),
            semantic = response.semantic.len(),
            "unified search"
        );
        Ok(response)
    }

    /// Substring keyword mode. An empty query degrades to the most recent
    /// filtered rows.
    pub fn search_keyword(
        &self,
        query: &str,
        filter: &PermitFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredPermit>, RetrievalError> {
        let rows = if query.trim().is_empty() {
            self.store.query_filtered(filter, top_k.min(500))?
        } else {
            self.store
                .query_description_substring(filter, query, top_k)?
        };
        Ok(rows.into_iter().map(ScoredPermit::unscored).collect())
    }

    /// Semantic mode: pre-filter, oversampled pool, cosine ranking. An
    /// empty query degrades to filter-only retrieval with no ranking.
    pub fn search_semantic(
        &self,
        query: &str,
        filter: &PermitFilter,
        top_k: usize,
        oversample: usize,
        return_scores: bool,
    ) -> Result<Vec<ScoredPermit>, RetrievalError> {
        let pool_limit = semantic_pool_limit(filter, top_k, oversample);
        let pool = self.store.query_filtered(filter, pool_limit)?;

        if query.trim().is_empty() {
            return Ok(pool
                .into_iter()
                .take(top_k)
                .map(ScoredPermit::unscored)
                .collect());
        }
        Ok(rank_within_pool(
            &self.index,
            pool,
            query,
            top_k,
            return_scores,
        ))
    }
}

fn semantic_pool_limit(filter: &PermitFilter, top_k: usize, oversample: usize) -> usize {
    if filter.is_empty() {
        (top_k * 3).max(500)
    } else {
        (top_k * oversample).max(1000)
    }
}
