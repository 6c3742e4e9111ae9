//! Per-iteration optimizer snapshots and the run tracker.

use std::fmt;
use std::time::{Duration, Instant};

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Why an optimizer run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvergenceReason {
    /// Relative change of the objective fell below the tolerance.
    FunctionValuesConverged,
    /// Projected gradient norm fell below the tolerance.
    GradientConverged,
    /// Iteration cap reached; the best coefficients found are returned.
    IterationsExceeded,
    /// The objective or gradient became non-finite.
    ObjectiveUnavailable,
    /// No step along any search direction decreased the objective.
    LineSearchFailed,
}

impl ConvergenceReason {
    /// Whether the run met its tolerance.
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            ConvergenceReason::FunctionValuesConverged | ConvergenceReason::GradientConverged
        )
    }
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConvergenceReason::FunctionValuesConverged => "function values converged",
            ConvergenceReason::GradientConverged => "gradient converged",
            ConvergenceReason::IterationsExceeded => "max iterations exceeded",
            ConvergenceReason::ObjectiveUnavailable => "objective unavailable",
            ConvergenceReason::LineSearchFailed => "line search failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of one accepted iterate.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerState {
    pub iteration: usize,
    pub coefficients: Array1<f64>,
    pub value: f64,
    pub gradient: Array1<f64>,
    /// Time since the run started.
    pub elapsed: Duration,
}

/// Append-only history of one optimizer run, sealed with a [`ConvergenceReason`].
#[derive(Debug, Clone)]
pub struct OptimizationStatesTracker {
    states: Vec<OptimizerState>,
    reason: Option<ConvergenceReason>,
    started: Instant,
}

impl Default for OptimizationStatesTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationStatesTracker {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            reason: None,
            started: Instant::now(),
        }
    }

    /// Record an iterate. Ignored once the tracker is sealed.
    pub fn track(&mut self, iteration: usize, coefficients: &Array1<f64>, value: f64, gradient: &Array1<f64>) {
        if self.reason.is_some() {
            return;
        }
        self.states.push(OptimizerState {
            iteration,
            coefficients: coefficients.clone(),
            value,
            gradient: gradient.clone(),
            elapsed: self.started.elapsed(),
        });
    }

    /// Seal the run. The first reason wins.
    pub fn seal(&mut self, reason: ConvergenceReason) {
        if self.reason.is_none() {
            self.reason = Some(reason);
        }
    }

    pub fn states(&self) -> &[OptimizerState] {
        &self.states
    }

    pub fn last(&self) -> Option<&OptimizerState> {
        self.states.last()
    }

    pub fn convergence_reason(&self) -> Option<ConvergenceReason> {
        self.reason
    }

    pub fn converged(&self) -> bool {
        self.reason.is_some_and(ConvergenceReason::is_converged)
    }

    /// Index of the last accepted iterate.
    pub fn iterations(&self) -> usize {
        self.states.last().map_or(0, |s| s.iteration)
    }

    pub fn values(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.value).collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.states.last().map_or(Duration::ZERO, |s| s.elapsed)
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        match (self.last(), self.reason) {
            (Some(last), Some(reason)) => format!(
                "{} iterations, value {:.6e}, {reason} in {:.3}s",
                last.iteration,
                last.value,
                last.elapsed.as_secs_f64()
            ),
            (Some(last), None) => format!("{} iterations, value {:.6e}, running", last.iteration, last.value),
            (None, _) => "no iterations".to_string(),
        }
    }
}
