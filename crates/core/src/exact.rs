//! Brute-force similarity over every item row.
//!
//! This is the correctness oracle for [`SimilarityIndex`](crate::SimilarityIndex)
//! and the retrieval path for callers who need exact results. It shares
//! [`Metric`] scoring and the ranking order with the index, so on a dataset the
//! index covers completely the two produce the same list.
//!
//! # Complexity
//! - `query`: O(n·d + n log n) where d is the embedding dimension
//! - `top`: O(n·d + n + k log k)

use crate::metric::{self, Metric};
use crate::{RecError, Result, VectorStore};

/// Exhaustive scorer for one metric.
#[derive(Debug, Clone, Copy)]
pub struct ExactSearch {
    metric: Metric,
}

impl ExactSearch {
    pub fn new(metric: Metric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Every item as `(internal id, score)`, by descending score with ties in
    /// ascending id order.
    pub fn query(&self, vector: &[f32], items: &VectorStore) -> Result<Vec<(usize, f32)>> {
        let mut scored = self.score_all(vector, items)?;
        scored.sort_by(metric::by_score_then_id);
        Ok(scored)
    }

    /// The first `n` entries of [`query`](Self::query), without sorting the tail.
    pub fn top(&self, vector: &[f32], items: &VectorStore, n: usize) -> Result<Vec<(usize, f32)>> {
        let mut scored = self.score_all(vector, items)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        if n < scored.len() {
            scored.select_nth_unstable_by(n - 1, metric::by_score_then_id);
            scored.truncate(n);
        }
        scored.sort_by(metric::by_score_then_id);
        Ok(scored)
    }

    fn score_all(&self, vector: &[f32], items: &VectorStore) -> Result<Vec<(usize, f32)>> {
        if vector.len() != items.dim() {
            return Err(RecError::DimensionMismatch(format!(
                "query has length {}, item dimension is {}",
                vector.len(),
                items.dim()
            )));
        }
        let scorer = self.metric.scorer(vector);
        Ok(items
            .rows()
            .enumerate()
            .map(|(id, row)| (id, scorer.score(row)))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
