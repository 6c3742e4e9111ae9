//! Limited-memory BFGS with optional box constraints.
//!
//! Search directions come from the two-loop recursion over the last
//! `history_size` curvature pairs. Step lengths come from a backtracking
//! Armijo search; with box constraints every trial point is projected onto
//! the box before it is evaluated, so every tracked iterate is feasible.
//!
//! Coefficients held at a bound by the gradient are fixed for the step: the
//! direction and the curvature pairs live in the subspace of the free ones,
//! and the history restarts whenever that set changes.

use std::collections::VecDeque;

use ndarray::{Array1, ArrayView1};

use super::config::{BoxConstraints, OptimizerConfig};
use super::state::{ConvergenceReason, OptimizationStatesTracker};
use crate::error::{GameError, Result};
use crate::function::ObjectiveFunction;
use crate::utils::{l2_norm, relative_change};

/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO_C1: f64 = 1e-4;
/// Step halvings tried before the line search gives up.
const MAX_LINE_SEARCH_TRIALS: usize = 50;
/// Curvature pairs with `s . y` at or below this are skipped.
const MIN_CURVATURE: f64 = 1e-10;

/// One curvature pair and `1 / (s . y)`.
#[derive(Debug, Clone)]
struct CurvaturePair {
    s: Array1<f64>,
    y: Array1<f64>,
    rho: f64,
}

/// The LBFGS optimizer.
///
/// With `reuse_previous_initial_state`, a call to [`optimize`](Self::optimize)
/// without an explicit initial vector resumes from the previous run's result.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    max_iterations: usize,
    tolerance: f64,
    history_size: usize,
    constraints: Option<BoxConstraints>,
    reuse_previous_initial_state: bool,
    previous: Option<Array1<f64>>,
    tracker: Option<OptimizationStatesTracker>,
}

impl Lbfgs {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            history_size: config.history_size,
            constraints: config.box_constraints.clone().filter(|b| !b.is_empty()),
            reuse_previous_initial_state: true,
            previous: None,
            tracker: None,
        }
    }

    pub fn set_reuse_previous_initial_state(&mut self, reuse: bool) {
        self.reuse_previous_initial_state = reuse;
    }

    pub fn is_reusing_previous_initial_state(&self) -> bool {
        self.reuse_previous_initial_state
    }

    /// Tracker of the most recent run.
    pub fn states_tracker(&self) -> Option<&OptimizationStatesTracker> {
        self.tracker.as_ref()
    }

    /// Minimize `objective` over `data`.
    ///
    /// Returns the final coefficients and objective value. Hitting the
    /// iteration cap is not an error; inspect the tracker's convergence reason.
    pub fn optimize<F: ObjectiveFunction>(
        &mut self,
        objective: &F,
        data: &F::Data,
        initial: Option<ArrayView1<f64>>,
    ) -> Result<(Array1<f64>, f64)> {
        let dimension = objective.dimension(data);
        let mut x = match (initial, &self.previous) {
            (Some(init), _) => init.to_owned(),
            (None, Some(previous)) if self.reuse_previous_initial_state => previous.clone(),
            _ => Array1::zeros(dimension),
        };
        if x.len() != dimension {
            return Err(GameError::DimensionMismatch {
                expected: dimension,
                got: x.len(),
            });
        }
        self.project(&mut x);

        let mut tracker = OptimizationStatesTracker::new();
        let (mut f, mut g) = objective.calculate(data, x.view());
        tracker.track(0, &x, f, &g);

        let reason = if !is_finite(f, &g) {
            Some(ConvergenceReason::ObjectiveUnavailable)
        } else if self.projected_gradient_norm(&x, &g) < self.tolerance {
            Some(ConvergenceReason::GradientConverged)
        } else {
            None
        };

        if let Some(reason) = reason {
            tracker.seal(reason);
        } else {
            let mut history: VecDeque<CurvaturePair> = VecDeque::with_capacity(self.history_size);
            let mut free = self.free_mask(&x, &g);

            for iteration in 1..=self.max_iterations {
                let mut step = None;
                // A failed quasi-Newton step is retried once along steepest descent.
                for _ in 0..2 {
                    let mut direction = two_loop_direction(&mask(&g, &free), &history);
                    if direction.dot(&g) >= 0.0 {
                        history.clear();
                        direction = -mask(&g, &free);
                    }
                    let initial_step = if history.is_empty() {
                        (1.0 / l2_norm(direction.view())).min(1.0)
                    } else {
                        1.0
                    };
                    step = self.line_search(objective, data, &x, f, &g, &direction, initial_step);
                    if step.is_some() || history.is_empty() {
                        break;
                    }
                    history.clear();
                }

                let Some((x_new, f_new, g_new)) = step else {
                    let reason = if self.projected_gradient_norm(&x, &g) < self.tolerance {
                        ConvergenceReason::GradientConverged
                    } else {
                        log::debug!("LBFGS line search failed at iteration {iteration}");
                        ConvergenceReason::LineSearchFailed
                    };
                    tracker.seal(reason);
                    break;
                };

                let s = mask(&(&x_new - &x), &free);
                let y = mask(&(&g_new - &g), &free);
                let sy = s.dot(&y);
                if sy > MIN_CURVATURE {
                    if history.len() == self.history_size {
                        history.pop_front();
                    }
                    history.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
                }

                let change = relative_change(f, f_new);
                x = x_new;
                f = f_new;
                g = g_new;
                tracker.track(iteration, &x, f, &g);

                // Pairs from another active set describe a different subspace.
                let next_free = self.free_mask(&x, &g);
                if next_free != free {
                    history.clear();
                    free = next_free;
                }

                if change < self.tolerance {
                    tracker.seal(ConvergenceReason::FunctionValuesConverged);
                    break;
                }
                if self.projected_gradient_norm(&x, &g) < self.tolerance {
                    tracker.seal(ConvergenceReason::GradientConverged);
                    break;
                }
                if iteration >= self.max_iterations {
                    log::warn!(
                        "LBFGS reached {} iterations without converging (value {f:.6e})",
                        self.max_iterations
                    );
                    tracker.seal(ConvergenceReason::IterationsExceeded);
                }
            }
        }

        self.previous = Some(x.clone());
        self.tracker = Some(tracker);
        Ok((x, f))
    }

    fn project(&self, x: &mut Array1<f64>) {
        if let Some(constraints) = &self.constraints {
            constraints.project(x);
        }
    }

    /// `false` for coefficients held at a bound by a gradient pointing out of the box.
    fn free_mask(&self, x: &Array1<f64>, g: &Array1<f64>) -> Vec<bool> {
        match &self.constraints {
            Some(constraints) => constraints.free_variables(x.view(), g.view()),
            None => vec![true; x.len()],
        }
    }

    fn projected_gradient_norm(&self, x: &Array1<f64>, g: &Array1<f64>) -> f64 {
        match &self.constraints {
            Some(constraints) => l2_norm(constraints.projected_gradient(x.view(), g.view()).view()),
            None => l2_norm(g.view()),
        }
    }

    /// Backtracking Armijo search along `direction`.
    ///
    /// The accepted point is a strict first-order descent step and never has a
    /// larger objective than `f`.
    #[allow(clippy::too_many_arguments)]
    fn line_search<F: ObjectiveFunction>(
        &self,
        objective: &F,
        data: &F::Data,
        x: &Array1<f64>,
        f: f64,
        g: &Array1<f64>,
        direction: &Array1<f64>,
        initial_step: f64,
    ) -> Option<(Array1<f64>, f64, Array1<f64>)> {
        let mut step = initial_step;
        for _ in 0..MAX_LINE_SEARCH_TRIALS {
            let mut candidate = x.clone();
            candidate.scaled_add(step, direction);
            self.project(&mut candidate);

            // Projection can cancel the step; such a trial is no descent.
            let decrease = g.dot(&(&candidate - x));
            if decrease >= 0.0 {
                step *= 0.5;
                continue;
            }
            let (f_new, g_new) = objective.calculate(data, candidate.view());
            if is_finite(f_new, &g_new) && f_new <= f + ARMIJO_C1 * decrease {
                return Some((candidate, f_new, g_new));
            }
            step *= 0.5;
        }
        None
    }
}

fn mask(v: &Array1<f64>, free: &[bool]) -> Array1<f64> {
    let mut masked = v.clone();
    for (value, &keep) in masked.iter_mut().zip(free) {
        if !keep {
            *value = 0.0;
        }
    }
    masked
}

fn is_finite(value: f64, gradient: &Array1<f64>) -> bool {
    value.is_finite() && gradient.iter().all(|g| g.is_finite())
}

/// `-H g` from the two-loop recursion, scaled by `s.y / y.y` of the newest pair.
fn two_loop_direction(g: &Array1<f64>, history: &VecDeque<CurvaturePair>) -> Array1<f64> {
    let mut q = g.clone();
    let mut alphas = Vec::with_capacity(history.len());

    for pair in history.iter().rev() {
        let alpha = pair.rho * pair.s.dot(&q);
        q.scaled_add(-alpha, &pair.y);
        alphas.push(alpha);
    }

    if let Some(newest) = history.back() {
        let gamma = 1.0 / (newest.rho * newest.y.dot(&newest.y));
        q *= gamma;
    }

    for (pair, alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = pair.rho * pair.y.dot(&q);
        q.scaled_add(alpha - beta, &pair.s);
    }

    -q
}
