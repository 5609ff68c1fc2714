//! Loading the four model artifacts a recommender is built from.
//!
//! The training pipeline exports:
//!
//! - user vectors: JSON array of arrays of numbers, row `i` for internal user `i`
//! - item vectors: same shape, for items
//! - user mapping: JSON array of `[external_id, internal_id]` pairs
//! - item mapping: same, for items
//!
//! Pairs rather than an object keep non-string external ids (integers, most
//! commonly) intact through JSON.

use crate::{IdRegistry, RecError, Result, VectorStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs::File;
use std::hash::Hash;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where each artifact lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub user_vectors: PathBuf,
    pub item_vectors: PathBuf,
    pub user_mapping: PathBuf,
    pub item_mapping: PathBuf,
}

/// Raw artifact contents, not yet validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifacts<U, I> {
    pub user_vectors: Vec<Vec<f32>>,
    pub item_vectors: Vec<Vec<f32>>,
    pub user_mapping: Vec<(U, usize)>,
    pub item_mapping: Vec<(I, usize)>,
}

impl<U, I> Artifacts<U, I>
where
    U: Eq + Hash + Clone + Debug + DeserializeOwned,
    I: Eq + Hash + Clone + Debug + DeserializeOwned,
{
    /// Read all four artifacts.
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        let artifacts = Self {
            user_vectors: read_json(&paths.user_vectors)?,
            item_vectors: read_json(&paths.item_vectors)?,
            user_mapping: read_json(&paths.user_mapping)?,
            item_mapping: read_json(&paths.item_mapping)?,
        };
        info!(
            users = artifacts.user_mapping.len(),
            items = artifacts.item_mapping.len(),
            "artifacts loaded"
        );
        Ok(artifacts)
    }
}

impl<U, I> Artifacts<U, I>
where
    U: Eq + Hash + Clone + Debug,
    I: Eq + Hash + Clone + Debug,
{
    /// Validate and convert into registries and stores.
    ///
    /// The embedding dimension is taken from the first item row, or the first
    /// user row when there are no items.
    pub fn into_parts(
        self,
    ) -> Result<(IdRegistry<U>, IdRegistry<I>, VectorStore, VectorStore)> {
        let dim = self
            .item_vectors
            .first()
            .or_else(|| self.user_vectors.first())
            .map(Vec::len)
            .ok_or_else(|| {
                RecError::DimensionMismatch("no vectors to infer a dimension from".to_string())
            })?;

        let users = IdRegistry::from_mapping(self.user_mapping)?;
        let items = IdRegistry::from_mapping(self.item_mapping)?;
        let user_vectors = VectorStore::from_rows(self.user_vectors, dim, users.len())?;
        let item_vectors = VectorStore::from_rows(self.item_vectors, dim, items.len())?;
        Ok((users, items, user_vectors, item_vectors))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        RecError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
