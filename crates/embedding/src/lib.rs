//! Permitflow Embedding
//!
//! Deterministic text → unit-vector embedding for permit descriptions.
//!
//! The embedder is a hashed bag-of-tokens at a fixed output dimension:
//! every alphanumeric token hashes to a bucket, bucket counts are
//! L2-normalized, and similarity is inner product (cosine, since vectors
//! are unit length). The same text always produces the same vector, texts
//! sharing vocabulary score positively, and encoding is pure CPU with no
//! model assets — which is exactly what the index layer needs: a stable,
//! reproducible vector function whose artifacts survive process restarts.
//!
//! Any model whose L2-normalized output supports cosine via inner product
//! can replace this implementation behind the same [`Embedder`] surface.

mod normalize;

pub use crate::normalize::{dot, l2_normalize_in_place};

use fxhash::hash64;
use serde::{Deserialize, Serialize};

/// Default output dimension. Matches the small-model tier the index was
/// sized for.
pub const DEFAULT_DIM: usize = 384;

/// Embedder configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct EmbeddingConfig {
    /// Output vector dimension, fixed at index build time.
    pub dim: usize,
    /// L2-normalize outputs (required for cosine-via-inner-product).
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_DIM,
            normalize: true,
        }
    }
}

/// Deterministic text-to-unit-vector function of fixed output dimension.
#[derive(Debug, Clone)]
pub struct Embedder {
    cfg: EmbeddingConfig,
}

impl Embedder {
    pub fn new(cfg: EmbeddingConfig) -> Self {
        Self { cfg }
    }

    pub fn dim(&self) -> usize {
        self.cfg.dim
    }

    /// Encode one text.
    pub fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.cfg.dim];
        for token in tokens(text) {
            let bucket = (hash64(token.as_bytes()) % self.cfg.dim as u64) as usize;
            v[bucket] += 1.0;
        }
        if self.cfg.normalize {
            l2_normalize_in_place(&mut v);
        }
        v
    }

    /// Encode a batch. Callers bound batch sizes; encoding itself is
    /// per-text and allocation is the only per-batch cost.
    pub fn encode<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.encode_one(t.as_ref())).collect()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> Embedder {
        Embedder::new(EmbeddingConfig::default())
    }

    #[test]
    fn same_text_same_vector() {
        let e = embedder();
        assert_eq!(e.encode_one("re-roof residential"), e.encode_one("re-roof residential"));
    }

    #[test]
    fn output_dimension_is_fixed() {
        let e = Embedder::new(EmbeddingConfig {
            dim: 64,
            normalize: true,
        });
        assert_eq!(e.encode_one("anything at all").len(), 64);
        assert_eq!(e.dim(), 64);
    }

    #[test]
    fn vectors_are_unit_length() {
        let e = embedder();
        let v = e.encode_one("new detached garage with electrical service");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_the_zero_vector() {
        let e = embedder();
        let v = e.encode_one("   ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_vocabulary_scores_higher_than_disjoint() {
        let e = embedder();
        let query = e.encode_one("roof replacement shingle");
        let close = e.encode_one("complete roof replacement with shingle tear off");
        let far = e.encode_one("interior bathroom plumbing rework");

        assert!(dot(&query, &close) > dot(&query, &far));
    }

    #[test]
    fn tokenization_is_case_and_punctuation_insensitive() {
        let e = embedder();
        assert_eq!(e.encode_one("RE-ROOF"), e.encode_one("re roof"));
    }

    #[test]
    fn batch_encode_matches_single_encode() {
        let e = embedder();
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = e.encode(&texts);
        assert_eq!(batch[0], e.encode_one("one"));
        assert_eq!(batch[1], e.encode_one("two"));
    }
}
