//! Approximate nearest-neighbor index over item vectors.
//!
//! Wraps an HNSW graph from `hnsw_rs`, one graph per index, with the
//! `anndists` distance matching the configured [`Metric`]. A query asks the
//! graph for `neighbor_count` ids with an `ef_search` candidate list, then
//! scores those ids exactly against the item store and ranks them with the
//! same order as [`ExactSearch`](crate::ExactSearch). When the search effort
//! covers every item the graph is skipped and every item is ranked, so full
//! effort gives exactly the oracle's answer.
//!
//! Metric mapping:
//!
//! | Metric      | Graph distance | Stored vector                         |
//! |-------------|----------------|---------------------------------------|
//! | `Angular`   | `DistCosine`   | item row                              |
//! | `Dot`       | `DistCosine`   | row plus `sqrt(max_norm² - \|x\|²)`    |
//! | `Euclidean` | `DistL2`       | item row                              |
//! | `Manhattan` | `DistL1`       | item row                              |
//! | `Hamming`   | `DistHamming`  | one `u32` per coordinate, `x > 0`     |
//!
//! The extra `Dot` coordinate gives every stored vector the same norm, so
//! maximum inner product becomes a cosine search. Queries use `0` for it.
//!
//! The graph is built exactly once and published through a [`OnceLock`], so
//! any number of threads may query it without locking.

use crate::metric::{self, Metric};
use crate::{RecError, Result, VectorStore};
use anndists::dist::distances::{DistCosine, DistHamming, DistL1, DistL2, Distance};
use hnsw_rs::prelude::{Hnsw, Neighbour};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info};

/// Upper bound on HNSW layers accepted by `hnsw_rs`.
const MAX_LAYERS: usize = 16;

/// Smallest `ef_search` used when the caller gives no search effort.
const MIN_EF_SEARCH: usize = 64;

/// Construction parameters for a [`SimilarityIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    pub metric: Metric,
    /// Graph edges kept per node (HNSW `M`). Must be at least 1.
    pub max_connections: usize,
    /// Candidate list size while inserting. Must be at least 1.
    pub ef_construction: usize,
    /// Worker threads used for insertion. `0` uses every available core.
    pub build_threads: usize,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            metric: Metric::Dot,
            max_connections: 16,
            ef_construction: 200,
            build_threads: 0,
        }
    }
}

/// HNSW index over item vectors.
///
/// Handles returned by queries are item internal ids: the item at row `i` of
/// the [`VectorStore`] passed to [`build`](SimilarityIndex::build) is `i`.
#[derive(Debug)]
pub struct SimilarityIndex {
    params: IndexParams,
    built: OnceLock<Built>,
}

#[derive(Debug)]
struct Built {
    /// Shared with the owner; used to re-score graph hits.
    items: Arc<VectorStore>,
    graph: Graph,
}

impl SimilarityIndex {
    /// Create an unbuilt index. Queries fail with [`RecError::NotBuilt`] until
    /// [`build`](Self::build) succeeds.
    pub fn new(params: IndexParams) -> Self {
        Self {
            params,
            built: OnceLock::new(),
        }
    }

    /// Insert every row of `items`, in internal-id order.
    ///
    /// Fails with [`RecError::AlreadyBuilt`] on a second call; an index is
    /// never rebuilt in place.
    pub fn build(&self, items: Arc<VectorStore>) -> Result<()> {
        if self.built.get().is_some() {
            return Err(RecError::AlreadyBuilt);
        }
        if self.params.max_connections == 0 {
            return Err(RecError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.params.ef_construction == 0 {
            return Err(RecError::Config(
                "ef_construction must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.build_threads)
            .build()?;
        // `parallel_insert` fans out on the current rayon pool.
        let graph = pool.install(|| Graph::build(&self.params, &items));

        let items_len = items.len();
        self.built
            .set(Built { items, graph })
            .map_err(|_| RecError::AlreadyBuilt)?;

        info!(
            items = items_len,
            max_connections = self.params.max_connections,
            ef_construction = self.params.ef_construction,
            metric = %self.params.metric,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "similarity index built"
        );
        Ok(())
    }

    /// Up to `neighbor_count` item ids, most similar first.
    ///
    /// `search_effort` is the graph's `ef_search`, never below
    /// `neighbor_count`; `None` uses `max(2 * neighbor_count, 64)`. Recall is
    /// approximate unless the effort covers every item.
    pub fn query(
        &self,
        vector: &[f32],
        neighbor_count: usize,
        search_effort: Option<usize>,
    ) -> Result<Vec<usize>> {
        Ok(self
            .query_with_scores(vector, neighbor_count, search_effort)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Like [`query`](Self::query), paired with each item's similarity score.
    pub fn query_with_scores(
        &self,
        vector: &[f32],
        neighbor_count: usize,
        search_effort: Option<usize>,
    ) -> Result<Vec<(usize, f32)>> {
        let built = self.built.get().ok_or(RecError::NotBuilt)?;
        let items = &built.items;
        if vector.len() != items.dim() {
            return Err(RecError::DimensionMismatch(format!(
                "query has length {}, index dimension is {}",
                vector.len(),
                items.dim()
            )));
        }
        if neighbor_count == 0 || items.is_empty() {
            return Ok(Vec::new());
        }

        let ef_search = search_effort
            .unwrap_or_else(|| neighbor_count.saturating_mul(2).max(MIN_EF_SEARCH))
            .max(neighbor_count);
        let candidates: Vec<usize> = if ef_search >= items.len() {
            (0..items.len()).collect()
        } else {
            built.graph.search(vector, neighbor_count, ef_search)
        };

        let scorer = self.params.metric.scorer(vector);
        let mut scored = candidates
            .iter()
            .map(|&id| Ok((id, scorer.score(items.row(id)?))))
            .collect::<Result<Vec<(usize, f32)>>>()?;
        scored.sort_by(metric::by_score_then_id);
        scored.truncate(neighbor_count);

        debug!(
            ef_search,
            candidates = candidates.len(),
            returned = scored.len(),
            "index query"
        );
        Ok(scored)
    }

    pub fn is_built(&self) -> bool {
        self.built.get().is_some()
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    /// Number of indexed items; `0` before the build.
    pub fn len(&self) -> usize {
        self.built.get().map_or(0, |b| b.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Graph internals
// ---------------------------------------------------------------------------

/// One HNSW graph, typed by the stored element and distance.
enum Graph {
    Angular(Hnsw<'static, f32, DistCosine>),
    Dot(Hnsw<'static, f32, DistCosine>),
    Euclidean(Hnsw<'static, f32, DistL2>),
    Manhattan(Hnsw<'static, f32, DistL1>),
    Hamming(Hnsw<'static, u32, DistHamming>),
}

impl Graph {
    fn build(params: &IndexParams, items: &VectorStore) -> Self {
        let n = items.len();
        let max_elements = n.max(1);
        let layers = MAX_LAYERS.min(((n as f32).ln().trunc() as usize).max(1));
        let (m, ef) = (params.max_connections, params.ef_construction);

        match params.metric {
            Metric::Angular => Graph::Angular(filled(
                Hnsw::new(m, max_elements, layers, ef, DistCosine {}),
                items.rows().map(<[f32]>::to_vec).collect(),
            )),
            Metric::Dot => Graph::Dot(filled(
                Hnsw::new(m, max_elements, layers, ef, DistCosine {}),
                augment_for_dot(items),
            )),
            Metric::Euclidean => Graph::Euclidean(filled(
                Hnsw::new(m, max_elements, layers, ef, DistL2 {}),
                items.rows().map(<[f32]>::to_vec).collect(),
            )),
            Metric::Manhattan => Graph::Manhattan(filled(
                Hnsw::new(m, max_elements, layers, ef, DistL1 {}),
                items.rows().map(<[f32]>::to_vec).collect(),
            )),
            Metric::Hamming => Graph::Hamming(filled(
                Hnsw::new(m, max_elements, layers, ef, DistHamming {}),
                items.rows().map(bits).collect(),
            )),
        }
    }

    fn search(&self, query: &[f32], knbn: usize, ef_search: usize) -> Vec<usize> {
        let hits: Vec<Neighbour> = match self {
            Graph::Angular(h) => h.search(query, knbn, ef_search),
            Graph::Dot(h) => {
                let mut augmented = Vec::with_capacity(query.len() + 1);
                augmented.extend_from_slice(query);
                augmented.push(0.0);
                h.search(&augmented, knbn, ef_search)
            }
            Graph::Euclidean(h) => h.search(query, knbn, ef_search),
            Graph::Manhattan(h) => h.search(query, knbn, ef_search),
            Graph::Hamming(h) => h.search(&bits(query), knbn, ef_search),
        };
        hits.into_iter().map(|n| n.d_id).collect()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Graph::Angular(_) => "cosine",
            Graph::Dot(_) => "augmented-cosine",
            Graph::Euclidean(_) => "l2",
            Graph::Manhattan(_) => "l1",
            Graph::Hamming(_) => "hamming",
        };
        f.debug_tuple("Graph").field(&kind).finish()
    }
}

/// Insert `rows` with data ids `0..rows.len()` and switch to search mode.
fn filled<T, D>(mut hnsw: Hnsw<'static, T, D>, rows: Vec<Vec<T>>) -> Hnsw<'static, T, D>
where
    T: Clone + Copy + Send + Sync + fmt::Debug + Serialize + DeserializeOwned + 'static,
    D: Distance<T> + Send + Sync,
{
    let refs: Vec<(&Vec<T>, usize)> = rows.iter().enumerate().map(|(id, r)| (r, id)).collect();
    hnsw.parallel_insert(&refs);
    hnsw.set_searching_mode(true);
    hnsw
}

/// Item rows with one extra coordinate that brings every norm up to the
/// largest one.
fn augment_for_dot(items: &VectorStore) -> Vec<Vec<f32>> {
    let max = items
        .rows()
        .map(|r| metric::dot(r, r))
        .fold(0.0_f32, f32::max);
    items
        .rows()
        .map(|r| {
            let mut v = Vec::with_capacity(r.len() + 1);
            v.extend_from_slice(r);
            v.push((max - metric::dot(r, r)).max(0.0).sqrt());
            v
        })
        .collect()
}

fn bits(v: &[f32]) -> Vec<u32> {
    v.iter().map(|&x| u32::from(metric::bit(x))).collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
