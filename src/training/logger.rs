//! Training progress logging gated by a verbosity level.
//!
//! The logger never installs a backend; it forwards to the `log` facade.

use serde::{Deserialize, Serialize};

use crate::evaluation::EvaluationResults;

/// How much the training loop reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Silent,
    #[default]
    Warning,
    Info,
    Debug,
}

/// Round-level reporting for one coordinate-descent run.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    n_rounds: usize,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity, n_rounds: 0 }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level && level != Verbosity::Silent
    }

    pub fn info(&self, message: &str) {
        if self.enabled(Verbosity::Info) {
            log::info!("{message}");
        }
    }

    pub fn debug(&self, message: &str) {
        if self.enabled(Verbosity::Debug) {
            log::debug!("{message}");
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(Verbosity::Warning) {
            log::warn!("{message}");
        }
    }

    pub fn start_training(&mut self, n_rounds: usize, update_sequence: &[String]) {
        self.n_rounds = n_rounds;
        self.info(&format!(
            "Starting coordinate descent: {n_rounds} rounds over [{}]",
            update_sequence.join(", ")
        ));
    }

    pub fn log_coordinate(&self, round: usize, coordinate_id: &str, elapsed: std::time::Duration) {
        self.debug(&format!(
            "[{}/{}] coordinate '{coordinate_id}' updated in {:.3}s",
            round + 1,
            self.n_rounds,
            elapsed.as_secs_f64()
        ));
    }

    pub fn log_metrics(
        &self,
        round: usize,
        objective: f64,
        training: &EvaluationResults,
        validation: Option<&EvaluationResults>,
    ) {
        let mut line = format!(
            "[{}/{}] objective={objective:.6} train: {training}",
            round + 1,
            self.n_rounds
        );
        if let Some(validation) = validation {
            line.push_str(&format!(" valid: {validation}"));
        }
        self.info(&line);
    }

    pub fn log_convergence(&self, round: usize, change: f64, tolerance: f64) {
        self.info(&format!(
            "Converged at round {}: relative change {change:.3e} < {tolerance:.3e}",
            round + 1
        ));
    }

    pub fn log_early_stopping(&self, round: usize, best_round: usize, metric: &str) {
        self.info(&format!(
            "Early stopping at round {}: best {metric} at round {}",
            round + 1,
            best_round + 1
        ));
    }

    pub fn finish_training(&self, rounds_run: usize, best_round: usize) {
        self.info(&format!(
            "Training complete: {rounds_run} rounds, best model from round {}",
            best_round + 1
        ));
    }
}
