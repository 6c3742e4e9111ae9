//! Gauss-Seidel coordinate descent over the coordinates of a GAME model.
//!
//! Each round updates the coordinates in the configured order. A coordinate
//! trains against the residual `total - own`, the summed scores of every
//! other coordinate, so a later coordinate sees the updates made earlier in
//! the same round. After the round the training (and optional validation)
//! evaluators run on the accumulated scores.
//!
//! ```text
//! Initialized -> Round(0) -> Round(1) -> ... -> Converged { round } | MaxRoundsReached
//! ```

use std::collections::BTreeMap;
use std::time::Instant;

use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use super::callback::{EarlyStopAction, EarlyStopping};
use super::config::GameTrainingConfig;
use super::logger::TrainingLogger;
use crate::coordinate::Coordinate;
use crate::data::{GameDataset, Scores};
use crate::error::{GameError, Result};
use crate::evaluation::{EvaluationResults, EvaluationSuite};
use crate::function::Loss;
use crate::model::GameModel;
use crate::utils::{relative_change, Parallelism};

/// Where a coordinate-descent run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateDescentState {
    Initialized,
    /// Zero-based index of the round in progress.
    Round(usize),
    /// The training metric stopped changing, or validation stopped improving.
    Converged { round: usize },
    MaxRoundsReached,
}

impl CoordinateDescentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CoordinateDescentState::Converged { .. } | CoordinateDescentState::MaxRoundsReached
        )
    }
}

/// The outcome of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: usize,
    pub model: GameModel,
    /// Weighted training loss on the accumulated scores plus every coordinate's
    /// regularization term.
    pub training_objective: f64,
    pub training: EvaluationResults,
    pub validation: Option<EvaluationResults>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateDescentResult {
    /// Model after the last round run.
    pub model: GameModel,
    /// Model of the best validation round, or the last model without validation data.
    pub best_model: GameModel,
    pub best_round: usize,
    pub history: Vec<RoundSummary>,
    pub state: CoordinateDescentState,
}

impl CoordinateDescentResult {
    pub fn best_summary(&self) -> Option<&RoundSummary> {
        self.history.get(self.best_round)
    }

    pub fn rounds_run(&self) -> usize {
        self.history.len()
    }
}

/// Weighted loss inputs of the training data.
#[derive(Debug)]
struct TrainingTargets {
    labels: Array1<f64>,
    offsets: Array1<f64>,
    weights: Array1<f64>,
}

impl TrainingTargets {
    fn from_dataset(dataset: &GameDataset) -> Self {
        Self {
            labels: dataset.responses(),
            offsets: dataset.offsets(),
            weights: dataset.weights(),
        }
    }

    fn loss(&self, loss: Loss, scores: &Scores) -> f64 {
        let mut total = 0.0;
        Zip::from(scores.view())
            .and(&self.offsets)
            .and(&self.labels)
            .and(&self.weights)
            .for_each(|&s, &o, &y, &w| {
                if w > 0.0 {
                    total += w * loss.loss(s + o, y);
                }
            });
        total
    }
}

/// The coordinate-descent driver.
///
/// Coordinates are built once from the training data and updated in place
/// every round.
#[derive(Debug)]
pub struct CoordinateDescent {
    config: GameTrainingConfig,
    coordinates: BTreeMap<String, Coordinate>,
    state: CoordinateDescentState,
}

impl CoordinateDescent {
    /// Build every coordinate of the update sequence on `training`.
    ///
    /// # Errors
    ///
    /// Configuration, unsupported-combination and data errors of the
    /// coordinates, or an evaluator the task cannot use.
    pub fn new(config: GameTrainingConfig, training: &GameDataset, parallelism: Parallelism) -> Result<Self> {
        config.validate()?;
        for evaluator in config.effective_evaluators() {
            evaluator.check_task(config.task)?;
        }
        let settings = config.coordinate_settings(parallelism);
        let coordinates = config
            .update_sequence
            .iter()
            .map(|id| {
                let coordinate = Coordinate::from_dataset(id.as_str(), training, &config.coordinates[id], &settings)?;
                Ok((id.clone(), coordinate))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            config,
            coordinates,
            state: CoordinateDescentState::Initialized,
        })
    }

    pub fn config(&self) -> &GameTrainingConfig {
        &self.config
    }

    pub fn state(&self) -> CoordinateDescentState {
        self.state
    }

    pub fn coordinate(&self, id: &str) -> Option<&Coordinate> {
        self.coordinates.get(id)
    }

    /// A GAME model holding every coordinate's initial model.
    pub fn initial_model(&self) -> GameModel {
        let mut model = GameModel::new(self.config.task);
        for (id, coordinate) in &self.coordinates {
            model.insert(id.clone(), coordinate.initial_model());
        }
        model
    }

    /// Train from the coordinates' initial models.
    pub fn run(&mut self, training: &GameDataset, validation: Option<&GameDataset>) -> Result<CoordinateDescentResult> {
        let initial = self.initial_model();
        self.run_from(initial, training, validation)
    }

    /// Train from `initial`, which must hold a model for every coordinate.
    ///
    /// # Errors
    ///
    /// [`GameError::ModelMismatch`] if `initial` lacks a coordinate's model or
    /// holds one of a different kind; errors of the coordinates and evaluators.
    pub fn run_from(
        &mut self,
        initial: GameModel,
        training: &GameDataset,
        validation: Option<&GameDataset>,
    ) -> Result<CoordinateDescentResult> {
        let evaluators = self.config.effective_evaluators();
        let training_suite =
            EvaluationSuite::new(evaluators.clone(), training)?.with_default_score(self.config.default_score);
        let validation_suite = validation
            .map(|v| EvaluationSuite::new(evaluators.clone(), v).map(|s| s.with_default_score(self.config.default_score)))
            .transpose()?;
        let targets = TrainingTargets::from_dataset(training);
        let loss = self.config.task.loss();

        let mut logger = TrainingLogger::new(self.config.verbosity);
        logger.start_training(self.config.n_rounds, &self.config.update_sequence);

        let primary = training_suite.primary().clone();
        let mut early_stopping = EarlyStopping::new(
            self.config.early_stopping_rounds.unwrap_or(0),
            primary.higher_is_better(),
        );

        // Per-coordinate scores and their sum.
        let mut model = initial;
        let mut scores: BTreeMap<String, Scores> = BTreeMap::new();
        let mut total = Scores::zeros(training.len());
        for (id, coordinate) in &self.coordinates {
            let own = coordinate.score(self.model_of(&model, id)?)?;
            total += &own;
            scores.insert(id.clone(), own);
        }

        let mut history: Vec<RoundSummary> = Vec::with_capacity(self.config.n_rounds);
        let mut best_round = 0;
        let mut previous_objective: Option<f64> = None;
        self.state = CoordinateDescentState::Initialized;

        for round in 0..self.config.n_rounds {
            self.state = CoordinateDescentState::Round(round);

            for id in &self.config.update_sequence {
                let started = Instant::now();
                let own = scores
                    .get(id)
                    .ok_or_else(|| GameError::ModelMismatch(id.clone()))?;
                let residual = &total - own;
                let current = self.model_of(&model, id)?.clone();
                let coordinate = self
                    .coordinates
                    .get_mut(id)
                    .ok_or_else(|| GameError::ModelMismatch(id.clone()))?;

                let (updated, updated_scores) = coordinate.update_model(&current, &residual, round)?;
                total = &residual + &updated_scores;
                scores.insert(id.clone(), updated_scores);
                model.insert(id.clone(), updated);
                logger.log_coordinate(round, id, started.elapsed());
            }

            let mut regularization = 0.0;
            for (id, coordinate) in &self.coordinates {
                regularization += coordinate.regularization_term_value(self.model_of(&model, id)?)?;
            }
            let training_objective = targets.loss(loss, &total) + regularization;
            let training_results = training_suite.evaluate(&total)?;
            let validation_results = match (&validation_suite, validation) {
                (Some(suite), Some(data)) => Some(suite.evaluate(&model.score(data)?)?),
                _ => None,
            };
            logger.log_metrics(round, training_objective, &training_results, validation_results.as_ref());

            let validation_metric = validation_results.as_ref().map(|r| r.primary().value);

            history.push(RoundSummary {
                round,
                model: model.clone(),
                training_objective,
                training: training_results,
                validation: validation_results,
            });

            let mut stop = false;
            if let Some(value) = validation_metric {
                match early_stopping.update(value) {
                    EarlyStopAction::Improved => best_round = round,
                    EarlyStopAction::Continue => {}
                    EarlyStopAction::Stop => {
                        logger.log_early_stopping(round, early_stopping.best_round(), &primary.to_string());
                        stop = true;
                    }
                }
            } else {
                best_round = round;
            }

            // Ranking metrics can stall while the loss still moves, so converge on the objective.
            if let Some(previous) = previous_objective {
                let change = relative_change(previous, training_objective);
                if change < self.config.tolerance {
                    logger.log_convergence(round, change, self.config.tolerance);
                    stop = true;
                }
            }
            previous_objective = Some(training_objective);

            if stop {
                self.state = CoordinateDescentState::Converged { round };
                break;
            }
        }

        if !self.state.is_terminal() {
            self.state = CoordinateDescentState::MaxRoundsReached;
        }
        logger.finish_training(history.len(), best_round);

        let best_model = history
            .get(best_round)
            .map(|summary| summary.model.clone())
            .unwrap_or_else(|| model.clone());
        Ok(CoordinateDescentResult {
            model,
            best_model,
            best_round,
            history,
            state: self.state,
        })
    }

    fn model_of<'a>(&self, model: &'a GameModel, id: &str) -> Result<&'a crate::model::DatumScoringModel> {
        model.get(id).ok_or_else(|| GameError::ModelMismatch(id.to_string()))
    }
}
