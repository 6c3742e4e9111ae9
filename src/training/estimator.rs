//! Train one GAME model per configuration and keep their evaluations.

use serde::{Deserialize, Serialize};

use super::config::GameTrainingConfig;
use super::coordinate_descent::{CoordinateDescent, CoordinateDescentResult};
use crate::data::GameDataset;
use crate::error::{GameError, Result};
use crate::evaluation::EvaluationResults;
use crate::model::GameModel;
use crate::utils::run_with_threads;

/// The trained model of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    /// [`GameTrainingConfig::descriptor`] of the configuration.
    pub descriptor: String,
    pub config: GameTrainingConfig,
    pub model: GameModel,
    /// Validation results of `model`, when validation data was given.
    pub evaluation: Option<EvaluationResults>,
    pub training: CoordinateDescentResult,
}

/// Fits a GAME model for each configuration, in order.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use glmix::coordinate::FixedEffectConfig;
/// use glmix::testing::{fixed_effect_dataset, GLOBAL_SHARD};
/// use glmix::training::{GameEstimator, GameTrainingConfig};
/// use glmix::TaskType;
///
/// let train = fixed_effect_dataset(TaskType::LinearRegression, 200, 3, 1).unwrap();
/// let valid = fixed_effect_dataset(TaskType::LinearRegression, 50, 3, 2).unwrap();
/// let global = FixedEffectConfig::builder().feature_shard_id(GLOBAL_SHARD).build().unwrap();
/// let config = GameTrainingConfig::builder()
///     .task(TaskType::LinearRegression)
///     .coordinates(BTreeMap::from([("global".to_string(), global.into())]))
///     .update_sequence(vec!["global".to_string()])
///     .build()
///     .unwrap();
///
/// let results = GameEstimator::new().fit(&train, Some(&valid), &[config]).unwrap();
/// assert_eq!(results.len(), 1);
/// assert!(results[0].evaluation.is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct GameEstimator {
    _private: (),
}

impl GameEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Train one model per configuration.
    ///
    /// Configurations train one after another; parallelism happens inside a
    /// run, bounded by each configuration's `n_threads`.
    ///
    /// # Errors
    ///
    /// The first configuration, data or evaluator error. Every configuration
    /// is checked before any training starts.
    pub fn fit(
        &self,
        training: &GameDataset,
        validation: Option<&GameDataset>,
        configs: &[GameTrainingConfig],
    ) -> Result<Vec<GameResult>> {
        if training.is_empty() {
            return Err(GameError::EmptyDataset("training data has no examples".into()));
        }
        for config in configs {
            config.validate()?;
            for evaluator in config.effective_evaluators() {
                evaluator.check_task(config.task)?;
            }
        }

        configs
            .iter()
            .map(|config| {
                run_with_threads(config.n_threads, |parallelism| {
                    let mut driver = CoordinateDescent::new(config.clone(), training, parallelism)?;
                    let result = driver.run(training, validation)?;
                    let evaluation = result.best_summary().and_then(|s| s.validation.clone());
                    Ok(GameResult {
                        descriptor: config.descriptor(),
                        config: config.clone(),
                        model: result.best_model.clone(),
                        evaluation,
                        training: result,
                    })
                })
            })
            .collect()
    }

    /// The result with the best validation evaluation, if any has one.
    pub fn select_best(results: &[GameResult]) -> Option<&GameResult> {
        results
            .iter()
            .filter(|r| r.evaluation.as_ref().is_some_and(|e| !e.primary().value.is_nan()))
            .fold(None, |best: Option<&GameResult>, r| match (best, &r.evaluation) {
                (Some(b), Some(e)) if b.evaluation.as_ref().is_some_and(|be| !e.better_than(be)) => Some(b),
                _ => Some(r),
            })
    }
}
