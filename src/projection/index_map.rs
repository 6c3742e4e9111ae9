//! Per-entity feature compaction.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::data::SparseVector;

/// Maps the features an entity actually uses onto a dense `0..k` range.
///
/// The map is monotone, so projected vectors stay sorted and the inverse
/// is exact: coefficients of unused features are zero in the original space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapProjector {
    original_dimension: usize,
    /// Original index of each projected index, strictly increasing.
    to_original: Vec<usize>,
}

impl IndexMapProjector {
    /// Build from the feature vectors an entity trains on.
    ///
    /// `always_keep` (typically the intercept) is included even if no vector stores it.
    pub fn build<'a>(
        original_dimension: usize,
        features: impl IntoIterator<Item = &'a SparseVector>,
        always_keep: Option<usize>,
    ) -> Self {
        let mut to_original: Vec<usize> = features
            .into_iter()
            .flat_map(|f| f.indices().iter().copied())
            .chain(always_keep)
            .filter(|&i| i < original_dimension)
            .collect();
        to_original.sort_unstable();
        to_original.dedup();
        Self {
            original_dimension,
            to_original,
        }
    }

    #[inline]
    pub fn original_dimension(&self) -> usize {
        self.original_dimension
    }

    #[inline]
    pub fn projected_dimension(&self) -> usize {
        self.to_original.len()
    }

    /// Projected position of an original index, if kept.
    #[inline]
    pub fn projected_index(&self, original: usize) -> Option<usize> {
        self.to_original.binary_search(&original).ok()
    }

    /// Project a feature vector; features outside the map are dropped.
    pub fn project_features(&self, features: &SparseVector) -> SparseVector {
        features.remap_monotone(|i| self.projected_index(i))
    }

    /// Gather original-space coefficients into the projected space.
    pub fn project_coefficients(&self, original: ArrayView1<f64>) -> Array1<f64> {
        self.to_original
            .iter()
            .map(|&i| original.get(i).copied().unwrap_or(0.0))
            .collect()
    }

    /// Scatter projected coefficients back into the original space.
    pub fn project_back(&self, projected: ArrayView1<f64>) -> Array1<f64> {
        let mut original = Array1::zeros(self.original_dimension);
        for (&i, &v) in self.to_original.iter().zip(projected.iter()) {
            original[i] = v;
        }
        original
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn projects_used_features_only() {
        let a = SparseVector::new([(1, 1.0), (5, 2.0)]).unwrap();
        let b = SparseVector::new([(5, 3.0), (7, 1.0)]).unwrap();
        let projector = IndexMapProjector::build(10, [&a, &b], Some(9));

        assert_eq!(projector.projected_dimension(), 4);
        let pb = projector.project_features(&b);
        assert_eq!(pb.indices(), &[1, 2]);
        assert_eq!(pb.values(), &[3.0, 1.0]);

        let other = SparseVector::new([(0, 1.0), (9, 1.0)]).unwrap();
        assert_eq!(projector.project_features(&other).indices(), &[3]);
    }

    #[test]
    fn coefficients_round_trip_through_the_map() {
        let a = SparseVector::new([(0, 1.0), (2, 1.0)]).unwrap();
        let projector = IndexMapProjector::build(4, [&a], None);
        let back = projector.project_back(array![0.5, -1.0].view());
        assert_eq!(back, array![0.5, 0.0, -1.0, 0.0]);
        assert_eq!(projector.project_coefficients(back.view()), array![0.5, -1.0]);
    }
}
