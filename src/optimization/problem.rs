//! An optimization problem: objective, optimizer, regularization and the
//! typed model the solution becomes.
//!
//! The problem owns the optimizer, so the optimizer's last solution survives
//! between rounds and warm starts the next call when no model is supplied.

use std::borrow::Cow;
use std::sync::Arc;

use ndarray::{Array1, ArrayView1};

use super::config::{BoxConstraints, GlmOptimizationConfig, OptimizerConfig, OptimizerType, VarianceComputationType};
use super::optimizer::Optimizer;
use super::state::OptimizationStatesTracker;
use super::variance::{full_variances, simple_variances};
use crate::data::{DownSampler, NormalizationContext, TrainingData};
use crate::error::{GameError, Result};
use crate::function::{
    soft_threshold, DistributedGlmObjective, GlmObjective, ObjectiveFunction, PointwiseLoss,
    RegularizationContext, SingleNodeGlmObjective, TwiceDiffObjective,
};
use crate::model::{Coefficients, GeneralizedLinearModel, TaskType};
use crate::utils::Parallelism;

/// A GLM problem solved against a fixed objective.
#[derive(Debug, Clone)]
pub struct OptimizationProblem<F: GlmObjective> {
    objective: F,
    optimizer: Optimizer,
    task: TaskType,
    regularization: RegularizationContext,
    regularization_weight: f64,
    variance: VarianceComputationType,
    down_sampler: Option<DownSampler>,
    /// Bounds over original-space coefficients, and the same bounds in the optimizer's space.
    constraints: Option<(BoxConstraints, BoxConstraints)>,
    last_value: Option<f64>,
}

/// Problem over a whole (partitioned) dataset.
pub type DistributedOptimizationProblem = OptimizationProblem<DistributedGlmObjective>;

/// Problem over one entity's data.
pub type SingleNodeOptimizationProblem = OptimizationProblem<SingleNodeGlmObjective>;

impl<F: GlmObjective> OptimizationProblem<F> {
    /// Bind `objective` to an optimizer built from `config`.
    ///
    /// # Errors
    ///
    /// [`GameError::UnsupportedCombination`] for TRON with an L1 component,
    /// TRON on a loss without a second derivative, or variance computation on
    /// such a loss. [`ConfigError::Conflict`](crate::ConfigError::Conflict) for
    /// a bound on the intercept under a shifting normalization.
    pub fn new(
        objective: F,
        config: &GlmOptimizationConfig,
        task: TaskType,
        variance: VarianceComputationType,
    ) -> Result<Self> {
        config.validate()?;
        let loss = objective.loss();
        let tron = config.optimizer.optimizer_type == OptimizerType::Tron;

        if tron && config.regularization.has_l1(config.regularization_weight) {
            return Err(GameError::unsupported(task, "TRON with L1 regularization"));
        }
        if tron && !loss.is_twice_differentiable() {
            return Err(GameError::unsupported(task, format!("TRON with {} loss", loss.name())));
        }
        if variance != VarianceComputationType::None && !loss.is_twice_differentiable() {
            return Err(GameError::unsupported(
                task,
                format!("coefficient variances with {} loss", loss.name()),
            ));
        }

        let constraints = match config.optimizer.box_constraints.as_ref().filter(|b| !b.is_empty()) {
            Some(bounds) => Some((bounds.clone(), objective.normalization().bounds_to_model_space(bounds)?)),
            None => None,
        };
        let optimizer_config = OptimizerConfig {
            box_constraints: constraints.as_ref().map(|(_, model)| model.clone()),
            ..config.optimizer.clone()
        };

        Ok(Self {
            objective,
            optimizer: Optimizer::new(&optimizer_config),
            task,
            regularization: config.regularization,
            regularization_weight: config.regularization_weight,
            variance,
            down_sampler: None,
            constraints,
            last_value: None,
        })
    }

    pub fn with_down_sampler(mut self, down_sampler: Option<DownSampler>) -> Self {
        self.down_sampler = down_sampler;
        self
    }

    #[inline]
    pub fn task(&self) -> TaskType {
        self.task
    }

    #[inline]
    pub fn objective(&self) -> &F {
        &self.objective
    }

    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    pub fn states_tracker(&self) -> Option<&OptimizationStatesTracker> {
        self.optimizer.states_tracker()
    }

    /// Objective value at the end of the last optimization, if any.
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Optimize from scratch (or from the optimizer's previous solution).
    pub fn run(&mut self, data: &TrainingData, round: usize) -> Result<GeneralizedLinearModel> {
        self.optimize(data, None, round)
    }

    /// Re-optimize warm-started from `model`.
    pub fn update_coefficient_means(
        &mut self,
        data: &TrainingData,
        model: &GeneralizedLinearModel,
        round: usize,
    ) -> Result<GeneralizedLinearModel> {
        if model.dimension() != data.dimension() {
            return Err(GameError::DimensionMismatch {
                expected: data.dimension(),
                got: model.dimension(),
            });
        }
        self.optimize(data, Some(model.coefficients().means()), round)
    }

    fn optimize(
        &mut self,
        data: &TrainingData,
        initial: Option<ArrayView1<f64>>,
        round: usize,
    ) -> Result<GeneralizedLinearModel> {
        let sampled = match &self.down_sampler {
            Some(sampler) => Cow::Owned(sampler.sample(data, round)),
            None => Cow::Borrowed(data),
        };
        let sampled: &TrainingData = &sampled;
        let normalization = self.objective.normalization();
        let initial = initial.map(|w| normalization.original_to_model_space(w));

        let (mut coefficients, value) =
            self.optimizer
                .optimize(&self.objective, sampled, initial.as_ref().map(|w| w.view()))?;

        let l1 = self.regularization.l1_weight(self.regularization_weight);
        if l1 > 0.0 {
            soft_threshold(&mut coefficients, l1);
            if let Some((_, model_bounds)) = &self.constraints {
                model_bounds.project(&mut coefficients);
            }
        }
        self.last_value = Some(value);

        if let Some(tracker) = self.states_tracker() {
            log::debug!("{} problem: {}", self.optimizer.optimizer_type(), tracker.summary());
        }

        let variances = self.compute_variances(sampled, coefficients.view());
        let normalization = self.objective.normalization();
        let mut means = normalization.model_to_original_space(coefficients.view());
        if let Some((bounds, _)) = &self.constraints {
            // Rescaling can round a coefficient just past its bound.
            bounds.project(&mut means);
        }
        let variances = variances.map(|v| normalization.variances_to_original_space(v.view()));

        Ok(GeneralizedLinearModel::new(
            self.task,
            Coefficients::new(means).with_variances(variances),
        ))
    }

    /// Variances in the objective's (normalized) space.
    fn compute_variances(&self, data: &TrainingData, coefficients: ArrayView1<f64>) -> Option<Array1<f64>> {
        match self.variance {
            VarianceComputationType::None => None,
            VarianceComputationType::Simple => {
                Some(simple_variances(self.objective.hessian_diagonal(data, coefficients)))
            }
            VarianceComputationType::Full => full_variances(&self.objective, data, coefficients).or_else(|| {
                log::warn!("Hessian is not positive definite; falling back to simple variances");
                Some(simple_variances(self.objective.hessian_diagonal(data, coefficients)))
            }),
        }
    }

    /// Regularization term of `model`, including the L1 part the smooth objective omits.
    pub fn regularization_term_value(&self, model: &GeneralizedLinearModel) -> f64 {
        let coefficients = self
            .objective
            .normalization()
            .original_to_model_space(model.coefficients().means());
        self.regularization
            .term_value(self.regularization_weight, coefficients.view())
    }

    /// Full objective (loss, L2 and L1) of `model` on `data`, without down-sampling.
    pub fn objective_value(&self, data: &TrainingData, model: &GeneralizedLinearModel) -> f64 {
        let coefficients = self
            .objective
            .normalization()
            .original_to_model_space(model.coefficients().means());
        let smooth = self.objective.value(data, coefficients.view());
        let l1 = self.regularization.l1_weight(self.regularization_weight);
        smooth + l1 * coefficients.iter().map(|w| w.abs()).sum::<f64>()
    }
}

impl DistributedOptimizationProblem {
    /// Problem whose objective aggregates over `n_partitions` with a tree of `tree_depth`.
    pub fn distributed(
        config: &GlmOptimizationConfig,
        task: TaskType,
        variance: VarianceComputationType,
        normalization: Arc<NormalizationContext>,
        n_partitions: Option<usize>,
        tree_depth: usize,
        parallelism: Parallelism,
    ) -> Result<Self> {
        let l2 = config.regularization.l2_weight(config.regularization_weight);
        let mut objective = DistributedGlmObjective::new(task.loss(), l2, normalization)
            .with_tree_depth(tree_depth)
            .with_parallelism(parallelism);
        if let Some(n) = n_partitions {
            objective = objective.with_partitions(n);
        }
        Self::new(objective, config, task, variance)
    }
}

impl SingleNodeOptimizationProblem {
    pub fn single_node(config: &GlmOptimizationConfig, task: TaskType, variance: VarianceComputationType) -> Result<Self> {
        let l2 = config.regularization.l2_weight(config.regularization_weight);
        Self::new(SingleNodeGlmObjective::new(task.loss(), l2), config, task, variance)
    }
}
