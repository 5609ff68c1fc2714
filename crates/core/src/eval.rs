//! Offline ranking metrics for recommendation lists.
//!
//! Used to compare retrieval settings against held-out interactions, and to
//! measure how much of the exact ranking the approximate index recovers.
//! Ranks are 1-based throughout.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Fraction of the first `k` recommendations that are relevant.
pub fn precision_at_k<I: Eq + Hash>(recommended: &[I], relevant: &HashSet<I>, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits_in_top(recommended, relevant, k) as f64 / k as f64
}

/// Fraction of the relevant items found in the first `k` recommendations.
pub fn recall_at_k<I: Eq + Hash>(recommended: &[I], relevant: &HashSet<I>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits_in_top(recommended, relevant, k) as f64 / relevant.len() as f64
}

/// Average precision over the first `k` recommendations, normalised by the
/// number of relevant items.
///
/// Each hit at rank `r` that is the `n`-th hit so far contributes `n / r`.
pub fn average_precision_at_k<I: Eq + Hash>(
    recommended: &[I],
    relevant: &HashSet<I>,
    k: usize,
) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let mut hits = 0usize;
    let mut total = 0.0;
    for (rank, item) in recommended.iter().take(k).enumerate() {
        if relevant.contains(item) {
            hits += 1;
            total += hits as f64 / (rank + 1) as f64;
        }
    }
    total / relevant.len() as f64
}

/// `1 / rank` of the first relevant recommendation, or `0.0` if none.
pub fn reciprocal_rank<I: Eq + Hash>(recommended: &[I], relevant: &HashSet<I>) -> f64 {
    recommended
        .iter()
        .position(|item| relevant.contains(item))
        .map_or(0.0, |pos| 1.0 / (pos + 1) as f64)
}

/// Fraction of `exact` present in `approximate`; `1.0` when `exact` is empty.
pub fn index_recall<I: Eq + Hash>(approximate: &[I], exact: &[I]) -> f64 {
    if exact.is_empty() {
        return 1.0;
    }
    let found: HashSet<&I> = approximate.iter().collect();
    exact.iter().filter(|item| found.contains(item)).count() as f64 / exact.len() as f64
}

fn hits_in_top<I: Eq + Hash>(recommended: &[I], relevant: &HashSet<I>, k: usize) -> usize {
    recommended
        .iter()
        .take(k)
        .filter(|item| relevant.contains(*item))
        .count()
}

/// Metrics averaged over every user with held-out interactions.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingReport {
    pub k: usize,
    pub users: usize,
    /// MAP@k.
    pub map: f64,
    pub mrr: f64,
    /// `precision[j]` is Precision@(j + 1), for `j < k`.
    pub precision: Vec<f64>,
    /// `recall[j]` is Recall@(j + 1), for `j < k`.
    pub recall: Vec<f64>,
}

/// Score `recommendations` against `truth` (held-out relevant items per user).
///
/// Averages run over the users in `truth`; a user with no recommendations
/// scores zero on every metric.
pub fn evaluate<U, I>(
    recommendations: &HashMap<U, Vec<I>>,
    truth: &HashMap<U, HashSet<I>>,
    k: usize,
) -> RankingReport
where
    U: Eq + Hash,
    I: Eq + Hash,
{
    let mut report = RankingReport {
        k,
        users: truth.len(),
        map: 0.0,
        mrr: 0.0,
        precision: vec![0.0; k],
        recall: vec![0.0; k],
    };
    if truth.is_empty() {
        return report;
    }

    let empty = Vec::new();
    for (user, relevant) in truth {
        let recs = recommendations.get(user).unwrap_or(&empty);
        report.map += average_precision_at_k(recs, relevant, k);
        report.mrr += reciprocal_rank(recs, relevant);
        for j in 0..k {
            report.precision[j] += precision_at_k(recs, relevant, j + 1);
            report.recall[j] += recall_at_k(recs, relevant, j + 1);
        }
    }

    let n = truth.len() as f64;
    report.map /= n;
    report.mrr /= n;
    report.precision.iter_mut().for_each(|p| *p /= n);
    report.recall.iter_mut().for_each(|r| *r /= n);
    report
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
