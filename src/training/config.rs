//! Configuration of one GAME training run.

use std::collections::{BTreeMap, BTreeSet};

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::logger::Verbosity;
use crate::coordinate::{CoordinateConfig, CoordinateSettings};
use crate::data::NormalizationType;
use crate::error::ConfigError;
use crate::evaluation::EvaluatorType;
use crate::model::TaskType;
use crate::optimization::VarianceComputationType;
use crate::utils::Parallelism;

/// Everything needed to train one GAME model.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use glmix::coordinate::FixedEffectConfig;
/// use glmix::training::GameTrainingConfig;
/// use glmix::TaskType;
///
/// let global = FixedEffectConfig::builder().feature_shard_id("global").build().unwrap();
/// let config = GameTrainingConfig::builder()
///     .task(TaskType::LogisticRegression)
///     .coordinates(BTreeMap::from([("global".to_string(), global.into())]))
///     .update_sequence(vec!["global".to_string()])
///     .n_rounds(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_evaluators()[0].to_string(), "AUC");
/// ```
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct GameTrainingConfig {
    pub task: TaskType,

    /// Coordinate id to coordinate configuration.
    pub coordinates: BTreeMap<String, CoordinateConfig>,

    /// Order in which coordinates update within a round.
    pub update_sequence: Vec<String>,

    /// Outer coordinate-descent rounds. Default: 1.
    #[builder(default = 1)]
    pub n_rounds: usize,

    /// Relative change of the primary training metric below which training
    /// has converged. Default: 1e-5.
    #[builder(default = 1e-5)]
    pub tolerance: f64,

    /// First evaluator is primary. Default: the task's default evaluator.
    #[builder(default)]
    pub evaluators: Vec<EvaluatorType>,

    /// Default: none.
    #[builder(default)]
    pub variance: VarianceComputationType,

    /// Applied to fixed-effect coordinates. Default: none.
    #[builder(default)]
    pub normalization: NormalizationType,

    /// Levels of the partition reduction. Default: 2.
    #[builder(default = 2)]
    pub tree_aggregate_depth: usize,

    /// Partitions of the fixed-effect data. Default: rayon pool size.
    pub n_partitions: Option<usize>,

    /// Default: 42.
    #[builder(default = 42)]
    pub seed: u64,

    /// Stop after this many rounds without validation improvement. Default: off.
    pub early_stopping_rounds: Option<usize>,

    /// Score used for examples a model cannot score. Default: 0.
    #[builder(default = 0.0)]
    pub default_score: f64,

    /// Thread count (0 = global pool, 1 = sequential). Default: 0.
    #[builder(default = 0)]
    pub n_threads: usize,

    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: game_training_config_builder::IsComplete> GameTrainingConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty, unknown or repeated update
    /// sequence entry, zero rounds, partitions or tree depth, a non-positive
    /// tolerance, or any invalid coordinate configuration.
    pub fn build(self) -> Result<GameTrainingConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl GameTrainingConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.update_sequence.is_empty() {
            return Err(ConfigError::EmptyUpdateSequence);
        }
        let mut seen = BTreeSet::new();
        for id in &self.update_sequence {
            if !self.coordinates.contains_key(id) {
                return Err(ConfigError::UnknownCoordinate(id.clone()));
            }
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::DuplicateCoordinate(id.clone()));
            }
        }
        for (field, value) in [
            ("n_rounds", self.n_rounds),
            ("tree_aggregate_depth", self.tree_aggregate_depth),
            ("n_partitions", self.n_partitions.unwrap_or(1)),
            ("early_stopping_rounds", self.early_stopping_rounds.unwrap_or(1)),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        for id in &self.update_sequence {
            self.coordinates[id].validate()?;
        }
        Ok(())
    }

    /// Configured evaluators, or the task default when none are named.
    pub fn effective_evaluators(&self) -> Vec<EvaluatorType> {
        if self.evaluators.is_empty() {
            vec![self.task.default_evaluator()]
        } else {
            self.evaluators.clone()
        }
    }

    /// Settings handed to every coordinate of this run.
    pub fn coordinate_settings(&self, parallelism: Parallelism) -> CoordinateSettings {
        CoordinateSettings {
            task: self.task,
            variance: self.variance,
            normalization: self.normalization,
            tree_aggregate_depth: self.tree_aggregate_depth,
            n_partitions: self.n_partitions,
            seed: self.seed,
            parallelism,
        }
    }

    /// Identifies this configuration among the results of one estimator run.
    pub fn descriptor(&self) -> String {
        let coordinates: Vec<String> = self
            .update_sequence
            .iter()
            .map(|id| format!("{id}={}", self.coordinates[id].descriptor()))
            .collect();
        format!("{}[{}]x{}", self.task, coordinates.join(";"), self.n_rounds)
    }
}
