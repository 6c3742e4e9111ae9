//! Optimizers and the optimization problems coordinates solve.
//!
//! - [`Lbfgs`]: limited-memory quasi-Newton with optional box constraints
//! - [`Tron`]: trust-region Newton on Hessian-vector products
//! - [`OptimizationProblem`]: objective + optimizer + regularization, producing
//!   a [`GeneralizedLinearModel`](crate::model::GeneralizedLinearModel)

mod config;
mod lbfgs;
mod optimizer;
mod problem;
mod state;
mod tron;
mod variance;

pub use config::{BoxConstraints, GlmOptimizationConfig, OptimizerConfig, OptimizerType, VarianceComputationType};
pub use lbfgs::Lbfgs;
pub use optimizer::Optimizer;
pub use problem::{DistributedOptimizationProblem, OptimizationProblem, SingleNodeOptimizationProblem};
pub use state::{ConvergenceReason, OptimizationStatesTracker, OptimizerState};
pub use tron::Tron;
pub use variance::{full_variances, simple_variances};
