//! annrec: top-K item recommendations over learned embeddings.
//!
//! Users and items live in a shared embedding space. Given a user, the
//! recommender finds the items whose vectors are most similar to the user's
//! vector, restricted to an optional allow-list, and returns them ranked.
//!
//! Two retrieval paths share the same id translation and filtering:
//!
//! - **Approximate**: a [`SimilarityIndex`] (an HNSW graph from `hnsw_rs`)
//!   built once over the item vectors.
//! - **Exact**: [`ExactSearch`], a brute-force scan used as the correctness
//!   oracle for the index.
//!
//! # Quick start
//!
//! ```rust
//! use annrec::{IdRegistry, Metric, Recommender, RecommenderConfig, VectorStore};
//!
//! let users = IdRegistry::from_external_ids(["alice"]).unwrap();
//! let items = IdRegistry::from_external_ids(["a", "b", "c"]).unwrap();
//! let user_vectors = VectorStore::from_rows(vec![vec![1.0, 0.0]], 2, users.len()).unwrap();
//! let item_vectors = VectorStore::from_rows(
//!     vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]],
//!     2,
//!     items.len(),
//! )
//! .unwrap();
//!
//! let config = RecommenderConfig {
//!     metric: Metric::Dot,
//!     ..RecommenderConfig::default()
//! };
//! let rec = Recommender::new(users, items, user_vectors, item_vectors, config).unwrap();
//! rec.build_index().unwrap();
//!
//! let top = rec.recommend_approximate(&"alice", &[], 2).unwrap();
//! assert_eq!(top, vec!["a", "c"]);
//! ```

pub mod artifacts;
pub mod eval;
pub mod exact;
pub mod index;
pub mod metric;
pub mod recommender;
pub mod registry;
pub mod store;

pub use artifacts::{ArtifactPaths, Artifacts};
pub use exact::ExactSearch;
pub use index::{IndexParams, SimilarityIndex};
pub use metric::Metric;
pub use recommender::{Recommender, RecommenderConfig};
pub use registry::IdRegistry;
pub use store::VectorStore;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecError {
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("item not found: {0}")]
    ItemNotFound(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid mapping: {0}")]
    InvalidMapping(String),
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),
    #[error("index out of range: {index} >= {count}")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("similarity index has not been built")]
    NotBuilt,
    #[error("similarity index is already built")]
    AlreadyBuilt,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rayon::ThreadPoolBuildError> for RecError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        RecError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RecError>;
