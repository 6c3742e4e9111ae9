//! Gaussian random projection shared by all entities of a coordinate.

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::data::SparseVector;

/// A `k x d` Gaussian matrix, optionally extended with one row that passes
/// the intercept through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionMatrix {
    matrix: Array2<f64>,
    intercept_index: Option<usize>,
}

impl ProjectionMatrix {
    /// Entries are drawn from `N(0, 1/k)`; the intercept column is left out of
    /// the random rows and copied into a dedicated last row.
    pub fn gaussian(k: usize, original_dimension: usize, intercept_index: Option<usize>, seed: u64) -> Self {
        let rows = k + usize::from(intercept_index.is_some());
        let mut matrix = Array2::zeros((rows, original_dimension));

        let std_dev = 1.0 / (k.max(1) as f64).sqrt();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        matrix.slice_mut(s![..k, ..]).mapv_inplace(|_| {
            let draw: f64 = StandardNormal.sample(&mut rng);
            draw * std_dev
        });

        if let Some(intercept) = intercept_index {
            matrix.slice_mut(s![..k, intercept]).fill(0.0);
            matrix[[k, intercept]] = 1.0;
        }

        Self {
            matrix,
            intercept_index,
        }
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    #[inline]
    pub fn projected_dimension(&self) -> usize {
        self.matrix.nrows()
    }

    #[inline]
    pub fn original_dimension(&self) -> usize {
        self.matrix.ncols()
    }

    /// Projected position of the intercept, if any.
    pub fn projected_intercept_index(&self) -> Option<usize> {
        self.intercept_index.map(|_| self.matrix.nrows() - 1)
    }

    /// `P x`, stored sparse.
    pub fn project_features(&self, features: &SparseVector) -> SparseVector {
        let mut dense = Array1::zeros(self.matrix.nrows());
        for (j, v) in features.iter().filter(|&(j, _)| j < self.matrix.ncols()) {
            dense.scaled_add(v, &self.matrix.column(j));
        }
        SparseVector::from_dense(dense.view())
    }

    /// `P w`: approximate projected coefficients for warm starts.
    pub fn project_coefficients(&self, original: ArrayView1<f64>) -> Array1<f64> {
        self.matrix.dot(&original)
    }

    /// `P^T z`: the original-space coefficients that score `x` exactly as `z` scores `P x`.
    pub fn project_back(&self, projected: ArrayView1<f64>) -> Array1<f64> {
        self.matrix.t().dot(&projected)
    }

    /// Diagonal of `P^T diag(v) P`.
    pub fn project_variances_back(&self, projected: ArrayView1<f64>) -> Array1<f64> {
        self.matrix.mapv(|p| p * p).t().dot(&projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn back_projection_preserves_scores() {
        let p = ProjectionMatrix::gaussian(3, 6, Some(5), 7);
        assert_eq!(p.projected_dimension(), 4);
        assert_eq!(p.projected_intercept_index(), Some(3));

        let x = SparseVector::new([(0, 1.0), (2, -0.5), (5, 1.0)]).unwrap();
        let z = array![0.3, -1.2, 0.7, 0.25];
        let projected_score = p.project_features(&x).dot(z.view());
        let original_score = x.dot(p.project_back(z.view()).view());
        assert_abs_diff_eq!(projected_score, original_score, epsilon = 1e-12);
    }

    #[test]
    fn same_seed_same_matrix() {
        assert_eq!(ProjectionMatrix::gaussian(2, 4, None, 11), ProjectionMatrix::gaussian(2, 4, None, 11));
        assert_ne!(ProjectionMatrix::gaussian(2, 4, None, 11), ProjectionMatrix::gaussian(2, 4, None, 12));
    }
}
