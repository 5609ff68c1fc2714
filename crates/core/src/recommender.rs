//! The recommender facade: id translation, retrieval, allow-list filtering.
//!
//! A [`Recommender`] owns both registries, both vector stores and the
//! similarity index. It is built once at startup and then shared read-only
//! (typically behind an `Arc`) by every request handler.
//!
//! Both entry points run the same pipeline and differ only in where the
//! ranked candidates come from:
//!
//! 1. external user id → internal id ([`RecError::UserNotFound`])
//! 2. allow-list → internal ids ([`RecError::ItemNotFound`]); empty means all
//! 3. user vector lookup
//! 4. candidates from the index (approximate) or the exact scan
//! 5. keep allowed candidates in order, stop at `top_k`
//! 6. internal ids → external ids

use crate::artifacts::Artifacts;
use crate::index::{IndexParams, SimilarityIndex};
use crate::{ExactSearch, IdRegistry, Metric, RecError, Result, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tuning knobs for retrieval and index construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Default result length for callers that do not pass one.
    pub top_k: usize,
    pub metric: Metric,
    /// Graph edges per node in the similarity index.
    pub max_connections: usize,
    pub ef_construction: usize,
    /// Index build threads; `0` uses every core.
    pub build_threads: usize,
    /// `ef_search` per index query; `None` is `max(2 * n_neighbors, 64)`.
    pub ef_search: Option<usize>,
    /// Candidate pool fetched from the index before allow-list filtering.
    pub n_neighbors: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            metric: Metric::Dot,
            max_connections: 16,
            ef_construction: 200,
            build_threads: 0,
            ef_search: None,
            n_neighbors: 500,
        }
    }
}

impl RecommenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(RecError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.ef_construction == 0 {
            return Err(RecError::Config(
                "ef_construction must be at least 1".to_string(),
            ));
        }
        if self.n_neighbors == 0 {
            return Err(RecError::Config("n_neighbors must be at least 1".to_string()));
        }
        if self.ef_search == Some(0) {
            return Err(RecError::Config("ef_search must be at least 1".to_string()));
        }
        Ok(())
    }

    fn index_params(&self) -> IndexParams {
        IndexParams {
            metric: self.metric,
            max_connections: self.max_connections,
            ef_construction: self.ef_construction,
            build_threads: self.build_threads,
        }
    }
}

/// Which retrieval path produces the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retrieval {
    Approximate,
    Exact,
}

/// Items a request may return.
enum Allowed {
    All,
    Only(HashSet<usize>),
}

impl Allowed {
    fn admits(&self, item: usize) -> bool {
        match self {
            Allowed::All => true,
            Allowed::Only(set) => set.contains(&item),
        }
    }
}

/// Top-K recommender over user and item embeddings.
///
/// `U` and `I` are the external user and item id types.
#[derive(Debug)]
pub struct Recommender<U, I> {
    users: IdRegistry<U>,
    items: IdRegistry<I>,
    user_vectors: VectorStore,
    item_vectors: Arc<VectorStore>,
    index: SimilarityIndex,
    exact: ExactSearch,
    config: RecommenderConfig,
}

impl<U, I> Recommender<U, I>
where
    U: Eq + Hash + Clone + Debug,
    I: Eq + Hash + Clone + Debug,
{
    /// Assemble a recommender from its parts. The index is **not** built yet;
    /// call [`build_index`](Self::build_index) before serving.
    ///
    /// Fails with [`RecError::DimensionMismatch`] if a store's row count
    /// differs from its registry's size or the two stores disagree on `dim`.
    pub fn new(
        users: IdRegistry<U>,
        items: IdRegistry<I>,
        user_vectors: VectorStore,
        item_vectors: VectorStore,
        config: RecommenderConfig,
    ) -> Result<Self> {
        config.validate()?;
        if user_vectors.len() != users.len() {
            return Err(RecError::DimensionMismatch(format!(
                "{} user vectors for {} registered users",
                user_vectors.len(),
                users.len()
            )));
        }
        if item_vectors.len() != items.len() {
            return Err(RecError::DimensionMismatch(format!(
                "{} item vectors for {} registered items",
                item_vectors.len(),
                items.len()
            )));
        }
        if user_vectors.dim() != item_vectors.dim() {
            return Err(RecError::DimensionMismatch(format!(
                "user dimension {} differs from item dimension {}",
                user_vectors.dim(),
                item_vectors.dim()
            )));
        }

        Ok(Self {
            users,
            items,
            user_vectors,
            item_vectors: Arc::new(item_vectors),
            index: SimilarityIndex::new(config.index_params()),
            exact: ExactSearch::new(config.metric),
            config,
        })
    }

    /// Build a recommender from loaded artifacts and build its index.
    pub fn from_artifacts(artifacts: Artifacts<U, I>, config: RecommenderConfig) -> Result<Self> {
        let (users, items, user_vectors, item_vectors) = artifacts.into_parts()?;
        let rec = Self::new(users, items, user_vectors, item_vectors, config)?;
        rec.build_index()?;
        Ok(rec)
    }

    /// Build the similarity index over every item vector. Runs once; must
    /// finish before the first approximate request.
    pub fn build_index(&self) -> Result<()> {
        self.index.build(Arc::clone(&self.item_vectors))
    }

    /// Top-`top_k` items for `user` via the similarity index.
    ///
    /// An empty `allow_list` admits every registered item.
    pub fn recommend_approximate(&self, user: &U, allow_list: &[I], top_k: usize) -> Result<Vec<I>> {
        self.recommend(user, allow_list, top_k, Retrieval::Approximate)
    }

    /// Top-`top_k` items for `user` via the exhaustive scan.
    pub fn recommend_exact(&self, user: &U, allow_list: &[I], top_k: usize) -> Result<Vec<I>> {
        self.recommend(user, allow_list, top_k, Retrieval::Exact)
    }

    fn recommend(
        &self,
        user: &U,
        allow_list: &[I],
        top_k: usize,
        retrieval: Retrieval,
    ) -> Result<Vec<I>> {
        let internal_user = self.users.to_internal(user).map_err(|_| {
            warn!(user = ?user, "unknown user");
            RecError::UserNotFound(format!("{user:?}"))
        })?;
        let allowed = self.translate_allow_list(allow_list)?;
        let vector = self.user_vectors.row(internal_user)?;

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let candidates: Vec<usize> = match retrieval {
            Retrieval::Approximate => {
                self.index
                    .query(vector, self.config.n_neighbors, self.config.ef_search)?
            }
            Retrieval::Exact => self
                .exact
                .query(vector, &self.item_vectors)?
                .into_iter()
                .map(|(id, _)| id)
                .collect(),
        };
        let pool = candidates.len();

        let picked = candidates
            .into_iter()
            .filter(|&id| allowed.admits(id))
            .take(top_k)
            .map(|id| self.items.to_external(id).cloned())
            .collect::<Result<Vec<I>>>()?;

        debug!(
            ?retrieval,
            internal_user,
            pool,
            returned = picked.len(),
            "recommend"
        );
        Ok(picked)
    }

    fn translate_allow_list(&self, allow_list: &[I]) -> Result<Allowed> {
        if allow_list.is_empty() {
            return Ok(Allowed::All);
        }
        allow_list
            .iter()
            .map(|item| {
                self.items
                    .to_internal(item)
                    .map_err(|_| RecError::ItemNotFound(format!("{item:?}")))
            })
            .collect::<Result<HashSet<usize>>>()
            .map(Allowed::Only)
    }

    pub fn users(&self) -> &IdRegistry<U> {
        &self.users
    }

    pub fn items(&self) -> &IdRegistry<I> {
        &self.items
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    pub fn is_index_built(&self) -> bool {
        self.index.is_built()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// Items A=[1,0], B=[0,1], C=[0.9,0.1]; one user "u" at [1,0]; dot product.
    fn three_items() -> Recommender<&'static str, &'static str> {
        let users = IdRegistry::from_external_ids(["u"]).unwrap();
        let items = IdRegistry::from_external_ids(["A", "B", "C"]).unwrap();
        let user_vectors = VectorStore::from_rows(vec![vec![1.0, 0.0]], 2, 1).unwrap();
        let item_vectors = VectorStore::from_rows(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]],
            2,
            3,
        )
        .unwrap();
        let config = RecommenderConfig {
            metric: Metric::Dot,
            ..RecommenderConfig::default()
        };
        let rec = Recommender::new(users, items, user_vectors, item_vectors, config).unwrap();
        rec.build_index().unwrap();
        rec
    }

    // ------------------------------------------------------------------
    // Reference scenarios
    // ------------------------------------------------------------------

    #[test]
    fn test_unrestricted_top_two() {
        let rec = three_items();
        assert_eq!(rec.recommend_approximate(&"u", &[], 2).unwrap(), vec!["A", "C"]);
        assert_eq!(rec.recommend_exact(&"u", &[], 2).unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn test_allow_list_of_one() {
        let rec = three_items();
        assert_eq!(rec.recommend_approximate(&"u", &["B"], 2).unwrap(), vec!["B"]);
        assert_eq!(rec.recommend_exact(&"u", &["B"], 2).unwrap(), vec!["B"]);
    }

    #[test]
    fn test_top_k_zero_is_empty() {
        let rec = three_items();
        assert!(rec.recommend_approximate(&"u", &[], 0).unwrap().is_empty());
        assert!(rec.recommend_exact(&"u", &["A", "C"], 0).unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // Edge cases
    // ------------------------------------------------------------------

    #[test]
    fn test_top_k_beyond_catalog_returns_all_eligible() {
        let rec = three_items();
        assert_eq!(
            rec.recommend_exact(&"u", &[], 50).unwrap(),
            vec!["A", "C", "B"]
        );
        assert_eq!(
            rec.recommend_approximate(&"u", &["C", "B"], 50).unwrap(),
            vec!["C", "B"]
        );
    }

    #[test]
    fn test_duplicate_allow_list_entries_are_harmless() {
        let rec = three_items();
        assert_eq!(
            rec.recommend_exact(&"u", &["B", "B", "A"], 5).unwrap(),
            vec!["A", "B"]
        );
    }

    #[test]
    fn test_unknown_user() {
        let rec = three_items();
        let err = rec.recommend_approximate(&"nobody", &[], 2).unwrap_err();
        assert!(matches!(err, RecError::UserNotFound(_)), "got {err:?}");
        let err = rec.recommend_exact(&"nobody", &[], 2).unwrap_err();
        assert!(matches!(err, RecError::UserNotFound(_)), "got {err:?}");
    }

    #[test]
    fn test_unknown_item_anywhere_in_allow_list() {
        let rec = three_items();
        let err = rec.recommend_approximate(&"u", &["A", "Z"], 2).unwrap_err();
        assert!(matches!(err, RecError::ItemNotFound(_)), "got {err:?}");
        let err = rec.recommend_exact(&"u", &["Z"], 0).unwrap_err();
        assert!(matches!(err, RecError::ItemNotFound(_)), "got {err:?}");
    }

    #[test]
    fn test_approximate_before_build_is_not_built() {
        let users = IdRegistry::from_external_ids([1_i64]).unwrap();
        let items = IdRegistry::from_external_ids([10_i64, 20]).unwrap();
        let rec = Recommender::new(
            users,
            items,
            VectorStore::from_rows(vec![vec![1.0]], 1, 1).unwrap(),
            VectorStore::from_rows(vec![vec![1.0], vec![2.0]], 1, 2).unwrap(),
            RecommenderConfig::default(),
        )
        .unwrap();
        assert!(!rec.is_index_built());
        assert!(matches!(
            rec.recommend_approximate(&1, &[], 1),
            Err(RecError::NotBuilt)
        ));
        // The exact path has no build step.
        assert_eq!(rec.recommend_exact(&1, &[], 1).unwrap(), vec![20]);
    }

    // ------------------------------------------------------------------
    // Construction checks
    // ------------------------------------------------------------------

    #[test]
    fn test_store_size_must_match_registry() {
        let users = IdRegistry::from_external_ids(["u", "v"]).unwrap();
        let items = IdRegistry::from_external_ids(["A"]).unwrap();
        let users_store = VectorStore::from_rows(vec![vec![1.0, 0.0]], 2, 1).unwrap();
        let items_store = VectorStore::from_rows(vec![vec![1.0, 0.0]], 2, 1).unwrap();
        let err = Recommender::new(
            users,
            items,
            users_store,
            items_store,
            RecommenderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RecError::DimensionMismatch(_)), "got {err:?}");
    }

    #[test]
    fn test_user_and_item_dims_must_agree() {
        let users = IdRegistry::from_external_ids(["u"]).unwrap();
        let items = IdRegistry::from_external_ids(["A"]).unwrap();
        let err = Recommender::new(
            users,
            items,
            VectorStore::from_rows(vec![vec![1.0, 0.0]], 2, 1).unwrap(),
            VectorStore::from_rows(vec![vec![1.0, 0.0, 0.0]], 3, 1).unwrap(),
            RecommenderConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RecError::DimensionMismatch(_)), "got {err:?}");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let users = IdRegistry::from_external_ids(["u"]).unwrap();
        let items = IdRegistry::from_external_ids(["A"]).unwrap();
        let err = Recommender::new(
            users,
            items,
            VectorStore::from_rows(vec![vec![1.0]], 1, 1).unwrap(),
            VectorStore::from_rows(vec![vec![1.0]], 1, 1).unwrap(),
            RecommenderConfig {
                n_neighbors: 0,
                ..RecommenderConfig::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RecError::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_huge_pool_size_covers_catalog() {
        let users = IdRegistry::from_external_ids(["u"]).unwrap();
        let items = IdRegistry::from_external_ids(["A", "B", "C"]).unwrap();
        let rec = Recommender::new(
            users,
            items,
            VectorStore::from_rows(vec![vec![1.0, 0.0]], 2, 1).unwrap(),
            VectorStore::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]], 2, 3)
                .unwrap(),
            RecommenderConfig {
                metric: Metric::Dot,
                n_neighbors: usize::MAX,
                ..RecommenderConfig::default()
            },
        )
        .unwrap();
        rec.build_index().unwrap();
        assert_eq!(rec.recommend_approximate(&"u", &[], 2).unwrap(), vec!["A", "C"]);
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: RecommenderConfig =
            serde_json::from_str(r#"{"metric": "angular", "max_connections": 24}"#).unwrap();
        assert_eq!(config.metric, Metric::Angular);
        assert_eq!(config.max_connections, 24);
        assert_eq!(config.ef_construction, 200);
        assert_eq!(config.n_neighbors, 500);
        assert_eq!(config.top_k, 10);
        assert_eq!(config.ef_search, None);
    }

    // ------------------------------------------------------------------
    // Concurrency
    // ------------------------------------------------------------------

    #[test]
    fn test_shared_across_threads() {
        let rec = Arc::new(three_items());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rec = Arc::clone(&rec);
                thread::spawn(move || rec.recommend_approximate(&"u", &[], 2).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), vec!["A", "C"]);
        }
    }
}
