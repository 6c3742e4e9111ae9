//! Evaluation of per-example scores.
//!
//! Every evaluator reduces `(score + offset, label, weight)` triples to one
//! value. Missing scores (`NaN`) are replaced by the default score carried
//! in [`EvaluationData`].
//!
//! # Available Evaluators
//!
//! - `AUC`, `AUC:<idType>`: higher is better
//! - `PRECISION@<k>:<idType>`: higher is better
//! - `RMSE`: lower is better
//! - `LOGISTIC_LOSS`, `POISSON_LOSS`, `SMOOTHED_HINGE_LOSS`, `SQUARED_LOSS`:
//!   weighted loss sums, lower is better

mod evaluator;
mod metrics;
mod results;

pub use evaluator::{EvaluationData, EvaluatorType};
pub use results::{EvaluationResults, EvaluationSuite, MetricValue};
