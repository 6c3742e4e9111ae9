//! Sparse feature vectors.

use ndarray::{Array1, ArrayView1, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// A sparse real vector stored as parallel, strictly increasing index/value arrays.
///
/// Explicit zeros are allowed but carry no weight in any product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVector {
    /// Build from unordered `(index, value)` pairs.
    ///
    /// Fails with [`GameError::DuplicateFeature`] if an index repeats.
    pub fn new(pairs: impl IntoIterator<Item = (usize, f64)>) -> Result<Self> {
        let mut pairs: Vec<(usize, f64)> = pairs.into_iter().collect();
        pairs.sort_unstable_by_key(|&(index, _)| index);

        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(GameError::DuplicateFeature { index: w[0].0 });
        }

        let (indices, values) = pairs.into_iter().unzip();
        Ok(Self { indices, values })
    }

    /// Build from pairs already sorted by strictly increasing index.
    pub(crate) fn from_sorted_unchecked(indices: Vec<usize>, values: Vec<f64>) -> Self {
        debug_assert_eq!(indices.len(), values.len());
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self { indices, values }
    }

    /// Keep the non-zero entries of a dense vector.
    pub fn from_dense(dense: ArrayView1<f64>) -> Self {
        let (indices, values) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i, *v))
            .unzip();
        Self { indices, values }
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Largest stored index.
    #[inline]
    pub fn max_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    /// Value at `index`, zero if absent.
    pub fn get(&self, index: usize) -> f64 {
        self.indices
            .binary_search(&index)
            .map(|pos| self.values[pos])
            .unwrap_or(0.0)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Dot product with a dense vector. Indices beyond `dense.len()` contribute nothing.
    #[inline]
    pub fn dot(&self, dense: ArrayView1<f64>) -> f64 {
        let n = dense.len();
        self.iter()
            .take_while(|&(i, _)| i < n)
            .map(|(i, v)| v * dense[i])
            .sum()
    }

    /// `dense += scale * self`, ignoring indices beyond `dense.len()`.
    #[inline]
    pub fn axpy_into(&self, scale: f64, mut dense: ArrayViewMut1<f64>) {
        let n = dense.len();
        for (i, v) in self.iter().take_while(|&(i, _)| i < n) {
            dense[i] += scale * v;
        }
    }

    #[inline]
    pub fn squared_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    /// Materialize as a dense vector of length `dimension`.
    pub fn to_dense(&self, dimension: usize) -> Array1<f64> {
        let mut dense = Array1::zeros(dimension);
        self.axpy_into(1.0, dense.view_mut());
        dense
    }

    /// Re-index through a monotone partial map; entries mapped to `None` are dropped.
    pub(crate) fn remap_monotone(&self, map: impl Fn(usize) -> Option<usize>) -> Self {
        let (indices, values) = self
            .iter()
            .filter_map(|(i, v)| map(i).map(|j| (j, v)))
            .unzip();
        Self::from_sorted_unchecked(indices, values)
    }
}
