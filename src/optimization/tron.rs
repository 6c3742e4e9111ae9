//! Trust-region Newton (TRON) in the style of liblinear.
//!
//! Each iteration approximately solves the trust-region subproblem with
//! conjugate gradient on Hessian-vector products, then adapts the radius
//! from the ratio of actual to predicted reduction. Steps that do not reduce
//! the objective enough are rejected.

use ndarray::{Array1, ArrayView1};

use super::config::OptimizerConfig;
use super::state::{ConvergenceReason, OptimizationStatesTracker};
use crate::error::{GameError, Result};
use crate::function::TwiceDiffObjective;
use crate::utils::{l2_norm, relative_change};

const ETA0: f64 = 1e-4;
const ETA1: f64 = 0.25;
const ETA2: f64 = 0.75;
const SIGMA1: f64 = 0.25;
const SIGMA2: f64 = 0.5;
const SIGMA3: f64 = 4.0;

/// The TRON optimizer. Requires a twice-differentiable objective.
#[derive(Debug, Clone)]
pub struct Tron {
    max_iterations: usize,
    tolerance: f64,
    max_cg_iterations: usize,
    reuse_previous_initial_state: bool,
    previous: Option<Array1<f64>>,
    tracker: Option<OptimizationStatesTracker>,
}

impl Tron {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            max_cg_iterations: config.max_cg_iterations,
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

    pub fn states_tracker(&self) -> Option<&OptimizationStatesTracker> {
        self.tracker.as_ref()
    }

    /// Minimize `objective` over `data`.
    pub fn optimize<F: TwiceDiffObjective>(
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

        let mut tracker = OptimizationStatesTracker::new();
        let (mut f, mut g) = objective.calculate(data, x.view());
        tracker.track(0, &x, f, &g);

        let mut g_norm = l2_norm(g.view());
        let mut delta = g_norm;

        if !f.is_finite() || !g_norm.is_finite() {
            tracker.seal(ConvergenceReason::ObjectiveUnavailable);
        } else if g_norm < self.tolerance {
            tracker.seal(ConvergenceReason::GradientConverged);
        } else {
            let mut accepted = 0usize;
            for iteration in 1..=self.max_iterations {
                let (s, r, cg_steps) = self.conjugate_gradient(objective, data, &x, &g, delta);
                let x_new = &x + &s;
                let (f_new, g_new) = objective.calculate(data, x_new.view());

                let gs = g.dot(&s);
                let predicted = -0.5 * (gs - s.dot(&r));
                let actual = f - f_new;
                let s_norm = l2_norm(s.view());

                if iteration == 1 {
                    delta = delta.min(s_norm);
                }

                let alpha = if f_new - f - gs <= 0.0 {
                    SIGMA3
                } else {
                    SIGMA1.max(-0.5 * (gs / (f_new - f - gs)))
                };

                delta = if actual < ETA0 * predicted || !f_new.is_finite() {
                    (alpha.max(SIGMA1) * s_norm).min(SIGMA2 * delta)
                } else if actual < ETA1 * predicted {
                    (SIGMA1 * delta).max((alpha * s_norm).min(SIGMA2 * delta))
                } else if actual < ETA2 * predicted {
                    (SIGMA1 * delta).max((alpha * s_norm).min(SIGMA3 * delta))
                } else {
                    delta.max((alpha * s_norm).min(SIGMA3 * delta))
                };

                log::trace!(
                    "TRON iter {iteration}: f {f_new:.6e} actual {actual:.3e} predicted {predicted:.3e} delta {delta:.3e} cg {cg_steps}"
                );

                if f_new.is_finite() && actual > ETA0 * predicted {
                    let change = relative_change(f, f_new);
                    x = x_new;
                    f = f_new;
                    g = g_new;
                    g_norm = l2_norm(g.view());
                    accepted += 1;
                    tracker.track(iteration, &x, f, &g);

                    if change < self.tolerance {
                        tracker.seal(ConvergenceReason::FunctionValuesConverged);
                        break;
                    }
                    if g_norm < self.tolerance {
                        tracker.seal(ConvergenceReason::GradientConverged);
                        break;
                    }
                }

                if f < -1.0e32 {
                    log::warn!("TRON objective unbounded below");
                    tracker.seal(ConvergenceReason::ObjectiveUnavailable);
                    break;
                }
                if predicted <= 0.0 && actual.abs() <= 0.0 {
                    tracker.seal(ConvergenceReason::FunctionValuesConverged);
                    break;
                }
                if actual.abs() <= 1.0e-12 * f.abs() && predicted.abs() <= 1.0e-12 * f.abs() {
                    tracker.seal(ConvergenceReason::FunctionValuesConverged);
                    break;
                }
                if iteration >= self.max_iterations {
                    log::warn!(
                        "TRON reached {} iterations ({accepted} accepted) without converging (value {f:.6e})",
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

    /// Truncated CG on `H s = -g` inside the radius `delta`.
    ///
    /// Returns the step, the final residual `-g - H s`, and the number of CG steps.
    fn conjugate_gradient<F: TwiceDiffObjective>(
        &self,
        objective: &F,
        data: &F::Data,
        x: &Array1<f64>,
        g: &Array1<f64>,
        delta: f64,
    ) -> (Array1<f64>, Array1<f64>, usize) {
        let mut s = Array1::zeros(g.len());
        let mut r = -g;
        let mut d = r.clone();
        let mut rtr = r.dot(&r);
        let cg_tolerance = 0.1 * l2_norm(g.view());

        let mut steps = 0;
        while steps < self.max_cg_iterations {
            if rtr.sqrt() <= cg_tolerance {
                break;
            }
            steps += 1;

            let hd = objective.hessian_vector(data, x.view(), d.view());
            let dhd = d.dot(&hd);

            if dhd <= 0.0 {
                let tau = boundary_step(&s, &d, delta);
                s.scaled_add(tau, &d);
                r.scaled_add(-tau, &hd);
                break;
            }

            let alpha = rtr / dhd;
            s.scaled_add(alpha, &d);
            if l2_norm(s.view()) > delta {
                s.scaled_add(-alpha, &d);
                let tau = boundary_step(&s, &d, delta);
                s.scaled_add(tau, &d);
                r.scaled_add(-tau, &hd);
                break;
            }

            r.scaled_add(-alpha, &hd);
            let rnew_trnew = r.dot(&r);
            let beta = rnew_trnew / rtr;
            d *= beta;
            d += &r;
            rtr = rnew_trnew;
        }

        (s, r, steps)
    }
}

/// Largest `tau >= 0` with `||s + tau d|| = delta`.
fn boundary_step(s: &Array1<f64>, d: &Array1<f64>, delta: f64) -> f64 {
    let std = s.dot(d);
    let sts = s.dot(s);
    let dtd = d.dot(d);
    let dsq = delta * delta;
    let rad = (std * std + dtd * (dsq - sts)).max(0.0).sqrt();
    if std >= 0.0 {
        (dsq - sts) / (std + rad)
    } else {
        (rad - std) / dtd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::QuadraticObjective;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn minimizes_a_quadratic() {
        let config = OptimizerConfig::builder().tolerance(1e-10).build().unwrap();
        let objective = QuadraticObjective::new(array![1.0, 100.0, 0.01], array![-3.0, 2.0, 5.0]);
        let mut tron = Tron::new(&config);
        let (x, value) = tron.optimize(&objective, &(), None).unwrap();
        for j in 0..3 {
            assert_abs_diff_eq!(x[j], objective.minimizer()[j], epsilon = 1e-4);
        }
        assert_abs_diff_eq!(value, 0.0, epsilon = 1e-8);

        let values = tron.states_tracker().unwrap().values();
        assert!(values.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn boundary_step_reaches_radius() {
        let s = array![0.5, 0.0];
        let d = array![1.0, 1.0];
        let tau = boundary_step(&s, &d, 2.0);
        let end = &s + &(&d * tau);
        assert_abs_diff_eq!(l2_norm(end.view()), 2.0, epsilon = 1e-12);
    }
}
