//! Testing utilities for glmix.
//!
//! Assertion helpers, a quadratic objective with a known minimum, and seeded
//! synthetic GAME datasets shared by unit tests, integration tests and benches.
//!
//! ```
//! use glmix::testing::{fixed_effect_dataset, GLOBAL_SHARD};
//! use glmix::TaskType;
//!
//! let dataset = fixed_effect_dataset(TaskType::LogisticRegression, 100, 4, 7).unwrap();
//! assert_eq!(dataset.shard(GLOBAL_SHARD).unwrap().dimension, 5);
//! ```

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{GameDataset, GameDatum, ShardInfo, SparseVector};
use crate::error::Result;
use crate::function::{sigmoid, ObjectiveFunction, TwiceDiffObjective};
use crate::model::TaskType;

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for floating point comparisons of O(1) values.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Feature shard shared by every example of the synthetic datasets.
pub const GLOBAL_SHARD: &str = "global";

/// Per-entity feature shard of [`mixed_effect_dataset`].
pub const ENTITY_SHARD: &str = "per_entity";

/// Id type of [`mixed_effect_dataset`] entities.
pub const ENTITY_ID_TYPE: &str = "userId";

// =============================================================================
// Floating Point Assertions
// =============================================================================

/// Assert that two f64 values are approximately equal.
///
/// ```
/// # use glmix::assert_approx_eq;
/// assert_approx_eq!(1.0, 1.0001, 0.001);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

/// Assert element-wise closeness of two vectors.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than `tolerance`.
pub fn assert_slice_approx_eq(actual: ArrayView1<f64>, expected: ArrayView1<f64>, tolerance: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        let diff = (a - e).abs();
        assert!(diff <= tolerance, "{context}[{i}]: {a} != {e} (diff={diff}, tolerance={tolerance})");
    }
}

// =============================================================================
// Quadratic Objective
// =============================================================================

/// `f(x) = 1/2 sum_j a_j (x_j - b_j)^2` with `a_j > 0`; minimized at `b` with value 0.
#[derive(Debug, Clone)]
pub struct QuadraticObjective {
    curvature: Array1<f64>,
    center: Array1<f64>,
}

impl QuadraticObjective {
    pub fn new(curvature: Array1<f64>, center: Array1<f64>) -> Self {
        assert_eq!(curvature.len(), center.len(), "curvature and center lengths differ");
        assert!(curvature.iter().all(|&a| a > 0.0), "curvature must be positive");
        Self { curvature, center }
    }

    pub fn minimizer(&self) -> &Array1<f64> {
        &self.center
    }
}

impl ObjectiveFunction for QuadraticObjective {
    type Data = ();

    fn dimension(&self, _: &()) -> usize {
        self.center.len()
    }

    fn calculate(&self, _: &(), x: ArrayView1<f64>) -> (f64, Array1<f64>) {
        let diff = &x - &self.center;
        let gradient = &self.curvature * &diff;
        (0.5 * gradient.dot(&diff), gradient)
    }
}

impl TwiceDiffObjective for QuadraticObjective {
    fn hessian_vector(&self, _: &(), _: ArrayView1<f64>, direction: ArrayView1<f64>) -> Array1<f64> {
        &self.curvature * &direction
    }

    fn hessian_diagonal(&self, _: &(), _: ArrayView1<f64>) -> Array1<f64> {
        self.curvature.clone()
    }
}

// =============================================================================
// Synthetic Datasets
// =============================================================================

fn response(task: TaskType, margin: f64, rng: &mut Xoshiro256PlusPlus) -> f64 {
    match task {
        TaskType::LogisticRegression | TaskType::SmoothedHingeLossLinearSvm => {
            (rng.gen::<f64>() < sigmoid(margin)) as u8 as f64
        }
        TaskType::LinearRegression => {
            let noise: f64 = StandardNormal.sample(rng);
            margin + 0.1 * noise
        }
        TaskType::PoissonRegression => Poisson::new(margin.exp().max(1e-9))
            .map(|p| p.sample(rng))
            .unwrap_or(0.0),
    }
}

/// `dimension` standard-normal features followed by an intercept.
fn dense_features(dimension: usize, rng: &mut Xoshiro256PlusPlus) -> SparseVector {
    let mut dense = Array1::<f64>::ones(dimension + 1);
    for v in dense.iter_mut().take(dimension) {
        *v = StandardNormal.sample(rng);
    }
    SparseVector::from_dense(dense.view())
}

/// `n` examples on [`GLOBAL_SHARD`] drawn from a GLM with seeded true coefficients.
pub fn fixed_effect_dataset(task: TaskType, n: usize, dimension: usize, seed: u64) -> Result<GameDataset> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let truth: Array1<f64> = (0..=dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let data = (0..n)
        .map(|_| {
            let x = dense_features(dimension, &mut rng);
            let y = response(task, x.dot(truth.view()), &mut rng);
            GameDatum::new(y).with_features(GLOBAL_SHARD, x)
        })
        .collect();

    let shards = BTreeMap::from([(GLOBAL_SHARD.to_string(), ShardInfo::with_intercept(dimension + 1))]);
    GameDataset::new(data, shards)
}

/// Global effect plus a per-entity slope and bias on a one-feature
/// [`ENTITY_SHARD`], keyed by [`ENTITY_ID_TYPE`].
pub fn mixed_effect_dataset(
    task: TaskType,
    n_entities: usize,
    per_entity: usize,
    dimension: usize,
    seed: u64,
) -> Result<GameDataset> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let global: Array1<f64> = (0..=dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut data = Vec::with_capacity(n_entities * per_entity);
    for entity in 0..n_entities {
        let slope: f64 = rng.gen_range(-1.0..1.0);
        let bias: f64 = rng.gen_range(-1.0..1.0);
        for _ in 0..per_entity {
            let x = dense_features(dimension, &mut rng);
            let z: f64 = StandardNormal.sample(&mut rng);
            let local = SparseVector::from_dense(ndarray::array![z, 1.0].view());
            let margin = x.dot(global.view()) + slope * z + bias;
            let y = response(task, margin, &mut rng);
            data.push(
                GameDatum::new(y)
                    .with_features(GLOBAL_SHARD, x)
                    .with_features(ENTITY_SHARD, local)
                    .with_id(ENTITY_ID_TYPE, format!("u{entity}")),
            );
        }
    }

    let shards = BTreeMap::from([
        (GLOBAL_SHARD.to_string(), ShardInfo::with_intercept(dimension + 1)),
        (ENTITY_SHARD.to_string(), ShardInfo::with_intercept(2)),
    ]);
    GameDataset::new(data, shards)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_has_zero_gradient_at_center() {
        let q = QuadraticObjective::new(ndarray::array![1.0, 2.0], ndarray::array![3.0, -1.0]);
        let (value, gradient) = q.calculate(&(), q.minimizer().view());
        assert_eq!(value, 0.0);
        assert_eq!(gradient, ndarray::array![0.0, 0.0]);
    }

    #[test]
    fn generators_are_seeded() {
        let a = mixed_effect_dataset(TaskType::LinearRegression, 3, 4, 2, 11).unwrap();
        let b = mixed_effect_dataset(TaskType::LinearRegression, 3, 4, 2, 11).unwrap();
        assert_eq!(a.len(), 12);
        assert_eq!(a.responses(), b.responses());
        assert_eq!(a.data()[5].id(ENTITY_ID_TYPE, 5).unwrap(), "u1");
    }

    #[test]
    fn binary_labels() {
        let d = fixed_effect_dataset(TaskType::LogisticRegression, 50, 3, 1).unwrap();
        assert!(d.responses().iter().all(|&y| y == 0.0 || y == 1.0));
    }
}
