//! Semantic ranking within a candidate pool, with the text-score hedge for
//! a stale or unloaded index.

use std::cmp::Ordering;

use index::EmbeddingIndex;
use ingest::Permit;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A permit plus its retrieval score. Scores are comparable only within
/// the result set they came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPermit {
    pub permit: Permit,
    pub score: Option<f32>,
}

impl ScoredPermit {
    pub fn unscored(permit: Permit) -> Self {
        Self {
            permit,
            score: None,
        }
    }
}

/// Minimum fraction of the pool that must be present in the index before
/// vector ranking is trusted over the text fallback.
const MIN_INDEX_OVERLAP: f64 = 0.5;

/// Rank `pool` against `query` by cosine similarity to the indexed
/// vectors, keeping the top `top_k`.
///
/// Pool rows absent from the index are excluded from vector ranking. When
/// the index is unloaded, or covers less than half the pool, ranking falls
/// back to whole-word text scoring over the same pool; a stale index
/// mid-cycle degrades retrieval quality instead of zeroing it.
pub fn rank_within_pool(
    index: &EmbeddingIndex,
    pool: Vec<Permit>,
    query: &str,
    top_k: usize,
    return_scores: bool,
) -> Vec<ScoredPermit> {
    if pool.is_empty() {
        return Vec::new();
    }
    let query = query.trim();
    if query.is_empty() {
        return pool
            .into_iter()
            .take(top_k)
            .map(ScoredPermit::unscored)
            .collect();
    }

    let Some(snapshot) = index.snapshot() else {
        warn!("index not loaded; using text-score fallback");
        return text_score_fallback(pool, query, top_k, return_scores);
    };

    let overlap = pool.iter().filter(|p| snapshot.contains(p.id)).count();
    let coverage = overlap as f64 / pool.len() as f64;
    if coverage < MIN_INDEX_OVERLAP {
        warn!(
            overlap,
            pool = pool.len(),
            "index covers too little of the pool; using text-score fallback"
        );
        return text_score_fallback(pool, query, top_k, return_scores);
    }

    let query_vector = index.embed_query(query);
    let mut scored: Vec<(f32, Permit)> = pool
        .into_iter()
        .filter_map(|permit| {
            snapshot
                .score(permit.id, &query_vector)
                .map(|score| (score, permit))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.id.cmp(&b.1.id))
    });

    debug!(ranked = scored.len(), top_k, "semantic ranking");
    scored
        .into_iter()
        .take(top_k)
        .map(|(score, permit)| ScoredPermit {
            permit,
            score: return_scores.then_some(score),
        })
        .collect()
}

/// Whole-word text scoring over the pool. Only rows containing the query
/// as a substring participate; scoring rewards frequency, standalone-word
/// hits, and an early first occurrence.
pub fn text_score_fallback(
    pool: Vec<Permit>,
    query: &str,
    top_k: usize,
    return_scores: bool,
) -> Vec<ScoredPermit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return pool
            .into_iter()
            .take(top_k)
            .map(ScoredPermit::unscored)
            .collect();
    }

    let mut scored: Vec<(i64, Permit)> = pool
        .into_iter()
        .filter_map(|permit| {
            let haystack = permit.description.to_lowercase();
            text_score(&haystack, &needle).map(|score| (score, permit))
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
    scored
        .into_iter()
        .take(top_k)
        .map(|(score, permit)| ScoredPermit {
            permit,
            score: return_scores.then_some(score as f32),
        })
        .collect()
}

fn text_score(haystack: &str, needle: &str) -> Option<i64> {
    let first = haystack.find(needle)?;
    let occurrences = haystack.matches(needle).count() as i64;

    let mut score = occurrences * 10;
    if haystack.split_whitespace().any(|word| word == needle) {
        score += 20;
    }
    if first < 50 {
        score += 10;
    }
    Some(score)
}
