//! Bidirectional mapping between external ids and dense internal ids.
//!
//! External ids come from upstream systems and are opaque: integers, strings,
//! anything hashable. Internal ids are `0..len` and index straight into a
//! [`VectorStore`](crate::VectorStore). One registry exists per entity type
//! (users, items). Both directions are built once and never mutated.

use crate::{RecError, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// External ↔ internal id mapping for one entity type.
#[derive(Debug, Clone)]
pub struct IdRegistry<K> {
    to_internal: HashMap<K, usize>,
    /// Position `i` holds the external id whose internal id is `i`.
    to_external: Vec<K>,
}

impl<K> IdRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Build a registry from a complete external → internal mapping.
    ///
    /// The inverse is derived here. Fails with [`RecError::InvalidMapping`] if
    /// the mapping is not injective, lists an external id twice, or leaves gaps
    /// in `0..len`.
    pub fn from_mapping<M>(mapping: M) -> Result<Self>
    where
        M: IntoIterator<Item = (K, usize)>,
    {
        let pairs: Vec<(K, usize)> = mapping.into_iter().collect();
        let count = pairs.len();

        let mut slots: Vec<Option<K>> = vec![None; count];
        let mut to_internal = HashMap::with_capacity(count);

        for (external, internal) in pairs {
            if internal >= count {
                return Err(RecError::InvalidMapping(format!(
                    "internal id {internal} for {external:?} is outside 0..{count}"
                )));
            }
            if let Some(previous) = &slots[internal] {
                return Err(RecError::InvalidMapping(format!(
                    "internal id {internal} is mapped from both {previous:?} and {external:?}"
                )));
            }
            if to_internal.insert(external.clone(), internal).is_some() {
                return Err(RecError::InvalidMapping(format!(
                    "external id {external:?} is listed more than once"
                )));
            }
            slots[internal] = Some(external);
        }

        // `count` pairs, each landing in a distinct slot below `count`, fill
        // every slot.
        let to_external = slots.into_iter().flatten().collect();

        Ok(Self {
            to_internal,
            to_external,
        })
    }

    /// Assign internal ids to `ids` in iteration order.
    pub fn from_external_ids<I>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
    {
        Self::from_mapping(ids.into_iter().enumerate().map(|(i, id)| (id, i)))
    }

    /// Internal id for `id`, or [`RecError::NotFound`] if it was never registered.
    pub fn to_internal(&self, id: &K) -> Result<usize> {
        self.to_internal
            .get(id)
            .copied()
            .ok_or_else(|| RecError::NotFound(format!("{id:?}")))
    }

    /// External id for `internal`.
    ///
    /// Every internal id handed out by this registry resolves, so a failure
    /// here means an id was fabricated somewhere upstream.
    pub fn to_external(&self, internal: usize) -> Result<&K> {
        self.to_external
            .get(internal)
            .ok_or_else(|| RecError::NotFound(format!("internal id {internal}")))
    }

    pub fn contains(&self, id: &K) -> bool {
        self.to_internal.contains_key(id)
    }

    /// `(internal, external)` pairs in internal-id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &K)> {
        self.to_external.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.to_external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_external.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
