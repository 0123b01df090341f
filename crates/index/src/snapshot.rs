use std::collections::HashMap;

/// Immutable in-memory view of the index, shared with readers via `Arc`.
///
/// Retrieval holds a snapshot for the duration of a ranking pass; a rebuild
/// swapping the manager's slot does not disturb readers mid-pass.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    dim: usize,
    ids: Vec<i64>,
    vectors: Vec<f32>,
    row_of: HashMap<i64, usize>,
}

impl IndexSnapshot {
    pub(crate) fn new(dim: usize, ids: Vec<i64>, vectors: Vec<f32>) -> Self {
        let row_of = ids
            .iter()
            .enumerate()
            .map(|(row, id)| (*id, row))
            .collect();
        Self {
            dim,
            ids,
            vectors,
            row_of,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn contains(&self, permit_id: i64) -> bool {
        self.row_of.contains_key(&permit_id)
    }

    /// Permit ids in row order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    /// Indexed vector for `permit_id`, if present.
    pub fn vector(&self, permit_id: i64) -> Option<&[f32]> {
        let row = *self.row_of.get(&permit_id)?;
        self.vectors.get(row * self.dim..(row + 1) * self.dim)
    }

    /// Inner-product score of `query` against the indexed vector for
    /// `permit_id`. `None` when the permit is not indexed (stale row).
    pub fn score(&self, permit_id: i64, query: &[f32]) -> Option<f32> {
        self.vector(permit_id).map(|v| embedding::dot(v, query))
    }
}
