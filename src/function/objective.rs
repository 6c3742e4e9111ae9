//! Objective functions: weighted GLM loss plus an L2 penalty.
//!
//! Two implementations share one aggregation core:
//!
//! - [`DistributedGlmObjective`]: splits the data into partitions, aggregates
//!   each partition in parallel and combines the partials with
//!   [`tree_aggregate`](crate::utils::tree_aggregate).
//! - [`SingleNodeGlmObjective`]: one sequential pass, used per entity inside
//!   random-effect coordinates (which are already parallel across entities).
//!
//! Both work in the normalized feature space described by a
//! [`NormalizationContext`] without materializing normalized features.

use std::sync::Arc;

use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;

use super::loss::{Loss, PointwiseLoss};
use crate::data::{LabeledPoint, NormalizationContext, TrainingData};
use crate::utils::{tree_aggregate, Parallelism};

// =============================================================================
// Traits
// =============================================================================

/// A differentiable objective over some data.
pub trait ObjectiveFunction: Send + Sync {
    type Data: ?Sized + Sync;

    /// Length of the coefficient vector the objective expects.
    fn dimension(&self, data: &Self::Data) -> usize;

    /// Objective value and gradient at `coefficients`.
    fn calculate(&self, data: &Self::Data, coefficients: ArrayView1<f64>) -> (f64, Array1<f64>);

    fn value(&self, data: &Self::Data, coefficients: ArrayView1<f64>) -> f64 {
        self.calculate(data, coefficients).0
    }

    fn gradient(&self, data: &Self::Data, coefficients: ArrayView1<f64>) -> Array1<f64> {
        self.calculate(data, coefficients).1
    }
}

/// An objective that also exposes second-order information.
pub trait TwiceDiffObjective: ObjectiveFunction {
    /// Hessian at `coefficients` applied to `direction`.
    fn hessian_vector(
        &self,
        data: &Self::Data,
        coefficients: ArrayView1<f64>,
        direction: ArrayView1<f64>,
    ) -> Array1<f64>;

    /// Diagonal of the Hessian at `coefficients`.
    fn hessian_diagonal(&self, data: &Self::Data, coefficients: ArrayView1<f64>) -> Array1<f64>;
}

/// A GLM objective over [`TrainingData`].
pub trait GlmObjective: TwiceDiffObjective<Data = TrainingData> {
    fn loss(&self) -> Loss;

    /// L2 weight applied inside the objective.
    fn l2_weight(&self) -> f64;

    /// Space the coefficients handed to this objective live in.
    fn normalization(&self) -> &NormalizationContext;
}

// =============================================================================
// Aggregation Core
// =============================================================================

/// Partial sums for value and gradient over a slice of points.
struct GradientSums {
    value: f64,
    sum_dz_x: Array1<f64>,
    sum_dz: f64,
}

impl GradientSums {
    fn zeros(dimension: usize) -> Self {
        Self {
            value: 0.0,
            sum_dz_x: Array1::zeros(dimension),
            sum_dz: 0.0,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.value += other.value;
        self.sum_dz_x += &other.sum_dz_x;
        self.sum_dz += other.sum_dz;
        self
    }
}

/// Partial sums for a Hessian-vector product (`sum q x`, `sum q`).
struct DirectionalSums {
    sum_q_x: Array1<f64>,
    sum_q: f64,
}

impl DirectionalSums {
    fn merge(mut self, other: Self) -> Self {
        self.sum_q_x += &other.sum_q_x;
        self.sum_q += other.sum_q;
        self
    }
}

/// Partial sums for the Hessian diagonal.
struct CurvatureSums {
    sum_h_x2: Array1<f64>,
    sum_h_x: Array1<f64>,
    sum_h: f64,
}

impl CurvatureSums {
    fn merge(mut self, other: Self) -> Self {
        self.sum_h_x2 += &other.sum_h_x2;
        self.sum_h_x += &other.sum_h_x;
        self.sum_h += other.sum_h;
        self
    }
}

/// Loss, L2 weight and normalization shared by both objective flavors.
#[derive(Debug, Clone)]
struct GlmCore {
    loss: Loss,
    l2_weight: f64,
    normalization: Arc<NormalizationContext>,
}

impl GlmCore {
    fn gradient_sums(&self, points: &[LabeledPoint], effective: ArrayView1<f64>, shift: f64) -> GradientSums {
        let mut sums = GradientSums::zeros(effective.len());
        for p in points {
            let w = p.weight();
            if w == 0.0 {
                continue;
            }
            let margin = p.margin(effective) + shift;
            let (loss, dz) = self.loss.loss_and_dz(margin, p.label());
            sums.value += w * loss;
            sums.sum_dz += w * dz;
            p.features().axpy_into(w * dz, sums.sum_dz_x.view_mut());
        }
        sums
    }

    fn directional_sums(
        &self,
        points: &[LabeledPoint],
        effective: ArrayView1<f64>,
        shift: f64,
        effective_direction: ArrayView1<f64>,
        direction_shift: f64,
    ) -> DirectionalSums {
        let mut sums = DirectionalSums {
            sum_q_x: Array1::zeros(effective.len()),
            sum_q: 0.0,
        };
        for p in points {
            let w = p.weight();
            if w == 0.0 {
                continue;
            }
            let margin = p.margin(effective) + shift;
            let projected = p.features().dot(effective_direction) + direction_shift;
            let q = w * self.loss.dzz(margin, p.label()) * projected;
            sums.sum_q += q;
            p.features().axpy_into(q, sums.sum_q_x.view_mut());
        }
        sums
    }

    fn curvature_sums(&self, points: &[LabeledPoint], effective: ArrayView1<f64>, shift: f64) -> CurvatureSums {
        let dimension = effective.len();
        let mut sums = CurvatureSums {
            sum_h_x2: Array1::zeros(dimension),
            sum_h_x: Array1::zeros(dimension),
            sum_h: 0.0,
        };
        for p in points {
            let w = p.weight();
            if w == 0.0 {
                continue;
            }
            let h = w * self.loss.dzz(p.margin(effective) + shift, p.label());
            sums.sum_h += h;
            for (j, x) in p.features().iter().filter(|&(j, _)| j < dimension) {
                sums.sum_h_x[j] += h * x;
                sums.sum_h_x2[j] += h * x * x;
            }
        }
        sums
    }

    fn finish_gradient(&self, sums: GradientSums, coefficients: ArrayView1<f64>) -> (f64, Array1<f64>) {
        let mut gradient = self.normalization.gradient_to_model_space(sums.sum_dz_x, sums.sum_dz);
        let mut value = sums.value;
        if self.l2_weight > 0.0 {
            value += 0.5 * self.l2_weight * coefficients.dot(&coefficients);
            gradient.scaled_add(self.l2_weight, &coefficients);
        }
        (value, gradient)
    }

    fn finish_hessian_vector(&self, sums: DirectionalSums, direction: ArrayView1<f64>) -> Array1<f64> {
        let mut hv = self.normalization.gradient_to_model_space(sums.sum_q_x, sums.sum_q);
        if self.l2_weight > 0.0 {
            hv.scaled_add(self.l2_weight, &direction);
        }
        hv
    }

    fn finish_hessian_diagonal(&self, sums: CurvatureSums) -> Array1<f64> {
        let mut diagonal =
            self.normalization
                .hessian_diagonal_to_model_space(sums.sum_h_x2, sums.sum_h_x.view(), sums.sum_h);
        if self.l2_weight > 0.0 {
            diagonal += self.l2_weight;
        }
        diagonal
    }
}

// =============================================================================
// DistributedGlmObjective
// =============================================================================

/// GLM objective aggregated across partitions with a tree reduction.
#[derive(Debug, Clone)]
pub struct DistributedGlmObjective {
    core: GlmCore,
    n_partitions: usize,
    tree_depth: usize,
    parallelism: Parallelism,
}

impl DistributedGlmObjective {
    pub fn new(loss: Loss, l2_weight: f64, normalization: Arc<NormalizationContext>) -> Self {
        Self {
            core: GlmCore {
                loss,
                l2_weight,
                normalization,
            },
            n_partitions: rayon::current_num_threads().max(1),
            tree_depth: 2,
            parallelism: Parallelism::Parallel,
        }
    }

    pub fn with_partitions(mut self, n_partitions: usize) -> Self {
        self.n_partitions = n_partitions.max(1);
        self
    }

    pub fn with_tree_depth(mut self, tree_depth: usize) -> Self {
        self.tree_depth = tree_depth.max(1);
        self
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn n_partitions(&self) -> usize {
        self.n_partitions
    }

    /// Aggregate `partial` over every partition and combine with `merge`.
    fn aggregate<T, P, M>(&self, points: &[LabeledPoint], empty: impl FnOnce() -> T, partial: P, merge: M) -> T
    where
        T: Send,
        P: Fn(&[LabeledPoint]) -> T + Sync + Send,
        M: Fn(T, T) -> T + Sync + Send,
    {
        let chunk_size = points.len().div_ceil(self.n_partitions).max(1);
        let partials: Vec<T> = if self.parallelism.is_parallel() {
            points.par_chunks(chunk_size).map(&partial).collect()
        } else {
            points.chunks(chunk_size).map(&partial).collect()
        };
        tree_aggregate(partials, self.tree_depth, merge).unwrap_or_else(empty)
    }
}

impl ObjectiveFunction for DistributedGlmObjective {
    type Data = TrainingData;

    fn dimension(&self, data: &TrainingData) -> usize {
        data.dimension()
    }

    fn calculate(&self, data: &TrainingData, coefficients: ArrayView1<f64>) -> (f64, Array1<f64>) {
        let (effective, shift) = self.core.normalization.effective_coefficients(coefficients);
        let sums = self.aggregate(
            data.points(),
            || GradientSums::zeros(data.dimension()),
            |chunk| self.core.gradient_sums(chunk, effective.view(), shift),
            GradientSums::merge,
        );
        self.core.finish_gradient(sums, coefficients)
    }
}

impl TwiceDiffObjective for DistributedGlmObjective {
    fn hessian_vector(
        &self,
        data: &TrainingData,
        coefficients: ArrayView1<f64>,
        direction: ArrayView1<f64>,
    ) -> Array1<f64> {
        let normalization = &self.core.normalization;
        let (effective, shift) = normalization.effective_coefficients(coefficients);
        let (effective_direction, direction_shift) = normalization.effective_coefficients(direction);
        let sums = self.aggregate(
            data.points(),
            || DirectionalSums {
                sum_q_x: Array1::zeros(data.dimension()),
                sum_q: 0.0,
            },
            |chunk| {
                self.core.directional_sums(
                    chunk,
                    effective.view(),
                    shift,
                    effective_direction.view(),
                    direction_shift,
                )
            },
            DirectionalSums::merge,
        );
        self.core.finish_hessian_vector(sums, direction)
    }

    fn hessian_diagonal(&self, data: &TrainingData, coefficients: ArrayView1<f64>) -> Array1<f64> {
        let (effective, shift) = self.core.normalization.effective_coefficients(coefficients);
        let sums = self.aggregate(
            data.points(),
            || CurvatureSums {
                sum_h_x2: Array1::zeros(data.dimension()),
                sum_h_x: Array1::zeros(data.dimension()),
                sum_h: 0.0,
            },
            |chunk| self.core.curvature_sums(chunk, effective.view(), shift),
            CurvatureSums::merge,
        );
        self.core.finish_hessian_diagonal(sums)
    }
}

impl GlmObjective for DistributedGlmObjective {
    fn loss(&self) -> Loss {
        self.core.loss
    }

    fn l2_weight(&self) -> f64 {
        self.core.l2_weight
    }

    fn normalization(&self) -> &NormalizationContext {
        &self.core.normalization
    }
}

// =============================================================================
// SingleNodeGlmObjective
// =============================================================================

/// GLM objective accumulated in one sequential pass.
#[derive(Debug, Clone)]
pub struct SingleNodeGlmObjective {
    core: GlmCore,
}

impl SingleNodeGlmObjective {
    pub fn new(loss: Loss, l2_weight: f64) -> Self {
        Self::with_normalization(loss, l2_weight, Arc::new(NormalizationContext::identity()))
    }

    pub fn with_normalization(loss: Loss, l2_weight: f64, normalization: Arc<NormalizationContext>) -> Self {
        Self {
            core: GlmCore {
                loss,
                l2_weight,
                normalization,
            },
        }
    }
}

impl ObjectiveFunction for SingleNodeGlmObjective {
    type Data = TrainingData;

    fn dimension(&self, data: &TrainingData) -> usize {
        data.dimension()
    }

    fn calculate(&self, data: &TrainingData, coefficients: ArrayView1<f64>) -> (f64, Array1<f64>) {
        let (effective, shift) = self.core.normalization.effective_coefficients(coefficients);
        let sums = self.core.gradient_sums(data.points(), effective.view(), shift);
        self.core.finish_gradient(sums, coefficients)
    }
}

impl TwiceDiffObjective for SingleNodeGlmObjective {
    fn hessian_vector(
        &self,
        data: &TrainingData,
        coefficients: ArrayView1<f64>,
        direction: ArrayView1<f64>,
    ) -> Array1<f64> {
        let normalization = &self.core.normalization;
        let (effective, shift) = normalization.effective_coefficients(coefficients);
        let (effective_direction, direction_shift) = normalization.effective_coefficients(direction);
        let sums = self.core.directional_sums(
            data.points(),
            effective.view(),
            shift,
            effective_direction.view(),
            direction_shift,
        );
        self.core.finish_hessian_vector(sums, direction)
    }

    fn hessian_diagonal(&self, data: &TrainingData, coefficients: ArrayView1<f64>) -> Array1<f64> {
        let (effective, shift) = self.core.normalization.effective_coefficients(coefficients);
        let sums = self.core.curvature_sums(data.points(), effective.view(), shift);
        self.core.finish_hessian_diagonal(sums)
    }
}

impl GlmObjective for SingleNodeGlmObjective {
    fn loss(&self) -> Loss {
        self.core.loss
    }

    fn l2_weight(&self) -> f64 {
        self.core.l2_weight
    }

    fn normalization(&self) -> &NormalizationContext {
        &self.core.normalization
    }
}
