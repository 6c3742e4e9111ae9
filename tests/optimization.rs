//! Optimizer and optimization-problem behavior on known objectives.

use std::collections::BTreeMap;

use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, ArrayView1};
use rstest::rstest;

use glmix::data::{LabeledPoint, SparseVector, TrainingData};
use glmix::function::{ObjectiveFunction, RegularizationContext, TwiceDiffObjective};
use glmix::optimization::{
    BoxConstraints, ConvergenceReason, GlmOptimizationConfig, Lbfgs, Optimizer, OptimizerConfig, OptimizerType,
    SingleNodeOptimizationProblem, Tron, VarianceComputationType,
};
use glmix::testing::QuadraticObjective;
use glmix::TaskType;

fn optimizer_config(optimizer_type: OptimizerType, tolerance: f64) -> OptimizerConfig {
    OptimizerConfig::builder()
        .optimizer_type(optimizer_type)
        .tolerance(tolerance)
        .max_iterations(500)
        .build()
        .unwrap()
}

fn quadratic() -> QuadraticObjective {
    QuadraticObjective::new(array![1.0, 25.0, 0.2, 4.0], array![2.0, -1.0, 5.0, 0.5])
}

// y ~ 1.5 x0 - 0.5 x1 + 0.3 with deterministic noise; intercept at index 2.
fn regression_data() -> TrainingData {
    let points = (0..40)
        .map(|i| {
            let x0 = (i as f64 * 0.37).sin();
            let x1 = (i as f64 * 0.11).cos();
            let noise = 0.05 * (i as f64 * 1.7).sin();
            let y = 1.5 * x0 - 0.5 * x1 + 0.3 + noise;
            LabeledPoint::new(y, SparseVector::new([(0, x0), (1, x1), (2, 1.0)]).unwrap())
        })
        .collect();
    TrainingData::new(points, 3).unwrap()
}

// =============================================================================
// Monotonic convergence
// =============================================================================

#[rstest]
#[case::lbfgs(OptimizerType::Lbfgs)]
#[case::tron(OptimizerType::Tron)]
fn tracked_values_never_increase(#[case] optimizer_type: OptimizerType) {
    let mut optimizer = Optimizer::new(&optimizer_config(optimizer_type, 1e-10));
    optimizer.optimize(&quadratic(), &(), None).unwrap();

    let values = optimizer.states_tracker().unwrap().values();
    assert!(values.len() > 1);
    for pair in values.windows(2) {
        assert!(pair[1] <= pair[0], "objective increased: {} -> {}", pair[0], pair[1]);
    }
}

#[test]
fn glm_problem_values_never_increase() {
    let config = GlmOptimizationConfig::builder()
        .regularization(RegularizationContext::l2())
        .regularization_weight(0.1)
        .build()
        .unwrap();
    let mut problem =
        SingleNodeOptimizationProblem::single_node(&config, TaskType::LinearRegression, VarianceComputationType::None)
            .unwrap();
    problem.run(&regression_data(), 0).unwrap();

    let values = problem.states_tracker().unwrap().values();
    assert!(values.windows(2).all(|w| w[1] <= w[0]));
}

// =============================================================================
// Warm start
// =============================================================================

#[rstest]
#[case::lbfgs(OptimizerType::Lbfgs)]
#[case::tron(OptimizerType::Tron)]
fn warm_start_needs_no_more_iterations(#[case] optimizer_type: OptimizerType) {
    let objective = quadratic();
    let config = optimizer_config(optimizer_type, 1e-9);

    let mut warm = Optimizer::new(&config);
    assert!(warm.is_reusing_previous_initial_state());
    warm.optimize(&objective, &(), None).unwrap();
    let cold_iterations = warm.states_tracker().unwrap().iterations();
    warm.optimize(&objective, &(), None).unwrap();
    let warm_iterations = warm.states_tracker().unwrap().iterations();

    assert!(warm_iterations <= cold_iterations);
}

#[test]
fn reuse_disabled_restarts_from_zero() {
    let objective = quadratic();
    let config = optimizer_config(OptimizerType::Lbfgs, 1e-9);
    let mut optimizer = Optimizer::new(&config);
    optimizer.set_reuse_previous_initial_state(false);

    optimizer.optimize(&objective, &(), None).unwrap();
    let first = optimizer.states_tracker().unwrap().states()[0].coefficients.clone();
    optimizer.optimize(&objective, &(), None).unwrap();
    let second = optimizer.states_tracker().unwrap().states()[0].coefficients.clone();
    assert_eq!(first, second);
    assert!(first.iter().all(|&x| x == 0.0));
}

// =============================================================================
// Box constraints
// =============================================================================

#[test]
fn box_constraints_hold_at_every_iterate() {
    let bounds = BoxConstraints::new(BTreeMap::from([(0, (-1.0, 1.0)), (2, (0.0, 3.0))])).unwrap();
    let config = OptimizerConfig::builder()
        .tolerance(1e-10)
        .max_iterations(500)
        .box_constraints(bounds.clone())
        .build()
        .unwrap();
    let objective = quadratic();
    let mut lbfgs = Lbfgs::new(&config);
    let (x, _) = lbfgs.optimize(&objective, &(), None).unwrap();

    for state in lbfgs.states_tracker().unwrap().states() {
        assert!(bounds.is_satisfied(state.coefficients.view()));
    }
    // Bounded coordinates land on the violated bound; the rest are untouched.
    assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(x[2], 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(x[1], -1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(x[3], 0.5, epsilon = 1e-4);
}

#[test]
fn tron_rejects_box_constraints() {
    let bounds = BoxConstraints::new(BTreeMap::from([(0, (0.0, 1.0))])).unwrap();
    let result = OptimizerConfig::builder()
        .optimizer_type(OptimizerType::Tron)
        .box_constraints(bounds)
        .build();
    assert!(result.is_err());
}

// =============================================================================
// Convergence reasons
// =============================================================================

#[rstest]
#[case::lbfgs(OptimizerType::Lbfgs)]
#[case::tron(OptimizerType::Tron)]
fn convergence_reason_matches_final_state(#[case] optimizer_type: OptimizerType) {
    let tolerance = 1e-8;
    let objective = quadratic();
    let mut optimizer = Optimizer::new(&optimizer_config(optimizer_type, tolerance));
    let (x, value) = optimizer.optimize(&objective, &(), None).unwrap();
    let tracker = optimizer.states_tracker().unwrap();

    match tracker.convergence_reason().unwrap() {
        ConvergenceReason::FunctionValuesConverged => assert!(value < 1e-6),
        ConvergenceReason::GradientConverged => {
            let gradient = &tracker.last().unwrap().gradient;
            let gradient_norm = gradient.dot(gradient).sqrt();
            assert!(gradient_norm < tolerance);
        }
        other => panic!("unexpected reason {other}"),
    }
    for j in 0..x.len() {
        assert_abs_diff_eq!(x[j], objective.minimizer()[j], epsilon = 1e-2);
    }
}

#[test]
fn iteration_cap_is_not_an_error() {
    let config = OptimizerConfig::builder()
        .tolerance(1e-14)
        .max_iterations(1)
        .build()
        .unwrap();
    let mut lbfgs = Lbfgs::new(&config);
    lbfgs.optimize(&quadratic(), &(), None).unwrap();
    assert_eq!(
        lbfgs.states_tracker().unwrap().convergence_reason(),
        Some(ConvergenceReason::IterationsExceeded)
    );
}

#[test]
fn tron_solves_a_quadratic() {
    let mut tron = Tron::new(&optimizer_config(OptimizerType::Tron, 1e-10));
    let objective = quadratic();
    let (x, _) = tron.optimize(&objective, &(), None).unwrap();
    assert!(tron.states_tracker().unwrap().converged());
    for j in 0..x.len() {
        assert_abs_diff_eq!(x[j], objective.minimizer()[j], epsilon = 1e-4);
    }
}

#[rstest]
#[case::lbfgs(OptimizerType::Lbfgs)]
#[case::tron(OptimizerType::Tron)]
fn least_squares_recovers_generating_coefficients(#[case] optimizer_type: OptimizerType) {
    let config = GlmOptimizationConfig::builder()
        .optimizer(optimizer_config(optimizer_type, 1e-10))
        .build()
        .unwrap();
    let mut problem =
        SingleNodeOptimizationProblem::single_node(&config, TaskType::LinearRegression, VarianceComputationType::None)
            .unwrap();
    let model = problem.run(&regression_data(), 0).unwrap();
    let means = model.coefficients().means();
    assert_abs_diff_eq!(means[0], 1.5, epsilon = 0.05);
    assert_abs_diff_eq!(means[1], -0.5, epsilon = 0.1);
    assert_abs_diff_eq!(means[2], 0.3, epsilon = 0.1);
}

// =============================================================================
// Bound-active subspace
// =============================================================================

/// `0.5 x'Ax - b'x` with a dense, strongly coupled `A`.
struct CoupledQuadratic {
    a: ndarray::Array2<f64>,
    b: ndarray::Array1<f64>,
}

impl ObjectiveFunction for CoupledQuadratic {
    type Data = ();

    fn dimension(&self, _: &()) -> usize {
        self.b.len()
    }

    fn calculate(&self, _: &(), x: ArrayView1<f64>) -> (f64, Array1<f64>) {
        let ax = self.a.dot(&x);
        (0.5 * x.dot(&ax) - self.b.dot(&x), ax - &self.b)
    }
}

#[test]
fn lbfgs_reaches_the_constrained_optimum_of_a_coupled_quadratic() {
    let objective = CoupledQuadratic {
        a: array![[1.0, 0.999], [0.999, 1.0]],
        b: array![10.0, 10.0],
    };
    let bounds = BoxConstraints::new(BTreeMap::from([(1, (f64::NEG_INFINITY, 4.0))])).unwrap();
    let config = OptimizerConfig::builder()
        .tolerance(1e-10)
        .max_iterations(500)
        .box_constraints(bounds.clone())
        .build()
        .unwrap();
    let mut lbfgs = Lbfgs::new(&config);
    let (x, _) = lbfgs.optimize(&objective, &(), None).unwrap();
    let tracker = lbfgs.states_tracker().unwrap();

    // x1 sits on its bound and x0 minimizes along it: x0 = 10 - 0.999 * 4.
    assert!(tracker.converged(), "{:?}", tracker.convergence_reason());
    assert_abs_diff_eq!(x[1], 4.0, epsilon = 1e-12);
    assert_abs_diff_eq!(x[0], 6.004, epsilon = 1e-4);
    let (_, g) = objective.calculate(&(), x.view());
    let projected = bounds.projected_gradient(x.view(), g.view());
    assert!(projected.dot(&projected).sqrt() < 1e-3, "projected gradient {projected}");
}

// =============================================================================
// Unavailable objective
// =============================================================================

/// An objective that is never finite.
struct Undefined;

impl ObjectiveFunction for Undefined {
    type Data = ();

    fn dimension(&self, _: &()) -> usize {
        2
    }

    fn calculate(&self, _: &(), _: ArrayView1<f64>) -> (f64, Array1<f64>) {
        (f64::NAN, Array1::from_elem(2, f64::NAN))
    }
}

impl TwiceDiffObjective for Undefined {
    fn hessian_vector(&self, _: &(), _: ArrayView1<f64>, direction: ArrayView1<f64>) -> Array1<f64> {
        direction.mapv(|_| f64::NAN)
    }

    fn hessian_diagonal(&self, _: &(), _: ArrayView1<f64>) -> Array1<f64> {
        Array1::from_elem(2, f64::NAN)
    }
}

#[rstest]
#[case::lbfgs(OptimizerType::Lbfgs)]
#[case::tron(OptimizerType::Tron)]
fn non_finite_objective_is_reported_not_raised(#[case] optimizer_type: OptimizerType) {
    let mut optimizer = Optimizer::new(&optimizer_config(optimizer_type, 1e-8));
    let (x, value) = optimizer.optimize(&Undefined, &(), None).unwrap();

    let tracker = optimizer.states_tracker().unwrap();
    assert_eq!(tracker.convergence_reason(), Some(ConvergenceReason::ObjectiveUnavailable));
    assert!(!tracker.converged());
    assert!(value.is_nan());
    assert_eq!(x, array![0.0, 0.0]);
}
