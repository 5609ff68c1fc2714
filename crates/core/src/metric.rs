//! Similarity kinds shared by the approximate index and the exact scan.
//!
//! Every metric is exposed as a *similarity*: larger means closer. Distance
//! metrics are negated so that one ordering (descending score) works for all
//! of them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The fixed set of supported similarity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity, in `[-1.0, 1.0]`.
    Angular,
    /// Raw inner product.
    #[serde(alias = "dot_product")]
    Dot,
    /// Negated L2 distance.
    #[serde(alias = "euclidian")]
    Euclidean,
    /// Negated L1 distance.
    Manhattan,
    /// Negated count of coordinates whose sign differs (`x > 0` is a set bit).
    Hamming,
}

impl Metric {
    /// Similarity between `a` and `b`. Higher is closer.
    ///
    /// Callers guarantee `a.len() == b.len()`; the stores and the index check
    /// dimensions at their boundaries.
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            Metric::Angular => cosine_similarity(a, b, l2_norm(a)),
            Metric::Dot => dot(a, b),
            Metric::Euclidean => -squared_l2(a, b).sqrt(),
            Metric::Manhattan => -a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f32>(),
            Metric::Hamming => -(a.iter().zip(b).filter(|(x, y)| bit(**x) != bit(**y)).count() as f32),
        }
    }

    /// Scorer with per-query work (the query norm for [`Metric::Angular`])
    /// hoisted out of the per-item loop.
    pub(crate) fn scorer<'q>(self, query: &'q [f32]) -> Scorer<'q> {
        Scorer {
            metric: self,
            query,
            query_norm: l2_norm(query),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Angular => "angular",
            Metric::Dot => "dot",
            Metric::Euclidean => "euclidean",
            Metric::Manhattan => "manhattan",
            Metric::Hamming => "hamming",
        };
        f.write_str(name)
    }
}

pub(crate) struct Scorer<'q> {
    metric: Metric,
    query: &'q [f32],
    query_norm: f32,
}

impl Scorer<'_> {
    pub(crate) fn score(&self, item: &[f32]) -> f32 {
        match self.metric {
            Metric::Angular => cosine_similarity(self.query, item, self.query_norm),
            other => other.similarity(self.query, item),
        }
    }
}

// ---------------------------------------------------------------------------
// Math helpers
// ---------------------------------------------------------------------------

/// Ranking order for `(id, score)` pairs: descending score, then ascending id.
pub(crate) fn by_score_then_id(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    // Adding 0.0 folds -0.0 into 0.0 so the two compare as a tie.
    (b.1 + 0.0)
        .total_cmp(&(a.1 + 0.0))
        .then_with(|| a.0.cmp(&b.0))
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Euclidean (L2) norm of `v`.
pub(crate) fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub(crate) fn bit(x: f32) -> bool {
    x > 0.0
}

/// Cosine similarity between `a` and `b`, with `a_norm` pre-computed.
///
/// Returns `0.0` if either vector is zero: a zero vector has no direction.
fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32) -> f32 {
    let b_norm = l2_norm(b);
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot(a, b) / (a_norm * b_norm)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_l2_norm_unit_vector() {
        assert!(close(l2_norm(&[1.0, 0.0, 0.0]), 1.0));
    }

    #[test]
    fn test_angular_identical_and_opposite() {
        let v = [1.0f32, 2.0, 3.0];
        assert!(close(Metric::Angular.similarity(&v, &v), 1.0));
        assert!(close(Metric::Angular.similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0));
        assert!(close(Metric::Angular.similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
    }

    #[test]
    fn test_angular_zero_vector_scores_zero() {
        assert_eq!(Metric::Angular.similarity(&[1.0, 2.0], &[0.0, 0.0]), 0.0);
        assert_eq!(Metric::Angular.similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_dot_is_unnormalised() {
        assert!(close(Metric::Dot.similarity(&[2.0, 0.0], &[3.0, 1.0]), 6.0));
    }

    #[test]
    fn test_distances_are_negated() {
        assert!(close(Metric::Euclidean.similarity(&[0.0, 0.0], &[3.0, 4.0]), -5.0));
        assert!(close(Metric::Manhattan.similarity(&[0.0, 0.0], &[3.0, -4.0]), -7.0));
        assert!(close(Metric::Hamming.similarity(&[1.0, -1.0, 0.5], &[1.0, 1.0, -0.5]), -2.0));
    }

    #[test]
    fn test_scorer_matches_similarity() {
        let q = [0.3f32, -1.2, 2.0];
        let item = [1.0f32, 0.5, -0.25];
        for metric in [
            Metric::Angular,
            Metric::Dot,
            Metric::Euclidean,
            Metric::Manhattan,
            Metric::Hamming,
        ] {
            assert!(close(metric.scorer(&q).score(&item), metric.similarity(&q, &item)));
        }
    }

    #[test]
    fn test_serde_names() {
        let m: Metric = serde_json::from_str("\"euclidian\"").unwrap();
        assert_eq!(m, Metric::Euclidean);
        let m: Metric = serde_json::from_str("\"dot\"").unwrap();
        assert_eq!(m, Metric::Dot);
        assert_eq!(serde_json::to_string(&Metric::Angular).unwrap(), "\"angular\"");
        assert_eq!(Metric::Manhattan.to_string(), "manhattan");
    }
}
