//! Fixed-effect coordinate: one global GLM over every example.

use std::sync::Arc;

use super::{CoordinateSettings, FixedEffectConfig};
use crate::data::{DownSampler, FeatureSummary, FixedEffectDataset, NormalizationContext, NormalizationType, Scores};
use crate::error::Result;
use crate::model::{FixedEffectModel, GeneralizedLinearModel};
use crate::optimization::DistributedOptimizationProblem;

#[derive(Debug)]
pub struct FixedEffectCoordinate {
    id: String,
    dataset: FixedEffectDataset,
    problem: DistributedOptimizationProblem,
}

impl FixedEffectCoordinate {
    pub fn new(
        id: String,
        dataset: FixedEffectDataset,
        config: &FixedEffectConfig,
        settings: &CoordinateSettings,
    ) -> Result<Self> {
        let normalization = match settings.normalization {
            NormalizationType::None => NormalizationContext::identity(),
            kind => {
                let summary =
                    FeatureSummary::from_features(dataset.dimension(), dataset.points().iter().map(|p| p.features()));
                NormalizationContext::build(kind, &summary, dataset.shard().intercept_index, dataset.shard_id())?
            }
        };

        let down_sampler = if config.down_sampling_rate < 1.0 {
            Some(DownSampler::for_task(
                settings.task,
                config.down_sampling_rate,
                settings.coordinate_seed(&id),
            )?)
        } else {
            None
        };

        let problem = DistributedOptimizationProblem::distributed(
            &config.optimization,
            settings.task,
            settings.variance,
            Arc::new(normalization),
            settings.n_partitions,
            settings.tree_aggregate_depth,
            settings.parallelism,
        )?
        .with_down_sampler(down_sampler);

        Ok(Self { id, dataset, problem })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dataset(&self) -> &FixedEffectDataset {
        &self.dataset
    }

    pub fn problem(&self) -> &DistributedOptimizationProblem {
        &self.problem
    }

    pub fn initial_model(&self) -> FixedEffectModel {
        FixedEffectModel::new(
            self.dataset.shard_id(),
            GeneralizedLinearModel::zeros(self.problem.task(), self.dataset.dimension()),
        )
    }

    /// Offsets become `offset + residual`; the current model warm starts the optimizer.
    pub fn update_model(
        &mut self,
        model: &FixedEffectModel,
        residual: &Scores,
        round: usize,
    ) -> Result<(FixedEffectModel, Scores)> {
        let data = self.dataset.with_residual(residual)?;
        let glm = self.problem.update_coefficient_means(&data, model.model(), round)?;

        if let Some(tracker) = self.problem.states_tracker() {
            log::debug!("coordinate '{}' round {round}: {}", self.id, tracker.summary());
        }

        let scores = self.dataset.score(glm.coefficients().means());
        Ok((FixedEffectModel::new(self.dataset.shard_id(), glm), scores))
    }

    pub fn score(&self, model: &FixedEffectModel) -> Scores {
        self.dataset.score(model.model().coefficients().means())
    }

    pub fn regularization_term_value(&self, model: &FixedEffectModel) -> f64 {
        self.problem.regularization_term_value(model.model())
    }
}
