//! Dense row-major storage for embedding vectors.
//!
//! One store per entity type. Row `i` is the embedding of internal id `i`.

use crate::{RecError, Result};

/// Fixed-size `len × dim` matrix of `f32` embeddings, read-only after
/// construction.
#[derive(Debug, Clone)]
pub struct VectorStore {
    values: Vec<f32>,
    dim: usize,
    len: usize,
}

impl VectorStore {
    /// Build a store from one `Vec` per row.
    ///
    /// `expected_len` is the number of ids registered for this entity type;
    /// every registered id must have exactly one row.
    pub fn from_rows(rows: Vec<Vec<f32>>, dim: usize, expected_len: usize) -> Result<Self> {
        check_shape(rows.len(), dim, expected_len)?;

        let mut values = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(RecError::DimensionMismatch(format!(
                    "row {i} has length {}, expected {dim}",
                    row.len()
                )));
            }
            values.extend_from_slice(row);
        }

        Self::finish(values, dim, expected_len)
    }

    /// Build a store from a flat row-major buffer of `expected_len * dim` values.
    pub fn from_flat(values: Vec<f32>, dim: usize, expected_len: usize) -> Result<Self> {
        if dim == 0 {
            return Err(RecError::DimensionMismatch(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if values.len() % dim != 0 {
            return Err(RecError::DimensionMismatch(format!(
                "{} values do not divide into rows of length {dim}",
                values.len()
            )));
        }
        check_shape(values.len() / dim, dim, expected_len)?;
        Self::finish(values, dim, expected_len)
    }

    fn finish(values: Vec<f32>, dim: usize, len: usize) -> Result<Self> {
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(RecError::InvalidEmbedding(format!(
                "row {} column {} is not finite",
                pos / dim,
                pos % dim
            )));
        }
        Ok(Self { values, dim, len })
    }

    /// Embedding for `internal`.
    pub fn row(&self, internal: usize) -> Result<&[f32]> {
        if internal >= self.len {
            return Err(RecError::IndexOutOfRange {
                index: internal,
                count: self.len,
            });
        }
        let start = internal * self.dim;
        Ok(&self.values[start..start + self.dim])
    }

    /// All rows in internal-id order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.values.chunks_exact(self.dim)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn check_shape(rows: usize, dim: usize, expected_len: usize) -> Result<()> {
    if dim == 0 {
        return Err(RecError::DimensionMismatch(
            "embedding dimension must be positive".to_string(),
        ));
    }
    if rows != expected_len {
        return Err(RecError::DimensionMismatch(format!(
            "{rows} rows for {expected_len} registered ids"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup() {
        let store =
            VectorStore::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]], 2, 2).unwrap();
        assert_eq!(store.row(1).unwrap(), &[3.0, 4.0]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.dim(), 2);
    }

    #[test]
    fn test_from_flat_matches_from_rows() {
        let flat = VectorStore::from_flat(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        let rows: Vec<&[f32]> = flat.rows().collect();
        assert_eq!(rows, vec![&[1.0, 2.0, 3.0][..], &[4.0, 5.0, 6.0][..]]);
    }

    #[test]
    fn test_row_out_of_range() {
        let store = VectorStore::from_rows(vec![vec![1.0]], 1, 1).unwrap();
        match store.row(1) {
            Err(RecError::IndexOutOfRange { index, count }) => {
                assert_eq!(index, 1);
                assert_eq!(count, 1);
            }
            other => panic!("expected IndexOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_ragged_row_is_dimension_mismatch() {
        let err = VectorStore::from_rows(vec![vec![1.0, 0.0], vec![1.0]], 2, 2).unwrap_err();
        assert!(matches!(err, RecError::DimensionMismatch(_)), "got {err:?}");
    }

    #[test]
    fn test_row_count_must_match_registry() {
        let err = VectorStore::from_rows(vec![vec![1.0, 0.0]], 2, 3).unwrap_err();
        assert!(matches!(err, RecError::DimensionMismatch(_)), "got {err:?}");
    }

    #[test]
    fn test_zero_dim_rejected() {
        assert!(VectorStore::from_rows(Vec::new(), 0, 0).is_err());
        assert!(VectorStore::from_flat(Vec::new(), 0, 0).is_err());
    }

    #[test]
    fn test_flat_buffer_must_divide_evenly() {
        let err = VectorStore::from_flat(vec![1.0, 2.0, 3.0], 2, 1).unwrap_err();
        assert!(matches!(err, RecError::DimensionMismatch(_)), "got {err:?}");
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let err = VectorStore::from_rows(vec![vec![1.0, f32::NAN]], 2, 1).unwrap_err();
        match err {
            RecError::InvalidEmbedding(msg) => assert!(msg.contains("row 0 column 1")),
            other => panic!("expected InvalidEmbedding, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_store() {
        let store = VectorStore::from_rows(Vec::new(), 4, 0).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.rows().count(), 0);
    }
}
