//! Static dispatch over the available optimizers.

use ndarray::{Array1, ArrayView1};

use super::config::{OptimizerConfig, OptimizerType};
use super::lbfgs::Lbfgs;
use super::state::OptimizationStatesTracker;
use super::tron::Tron;
use crate::error::Result;
use crate::function::TwiceDiffObjective;

/// An LBFGS or TRON optimizer built from an [`OptimizerConfig`].
#[derive(Debug, Clone)]
pub enum Optimizer {
    Lbfgs(Lbfgs),
    Tron(Tron),
}

impl Optimizer {
    pub fn new(config: &OptimizerConfig) -> Self {
        match config.optimizer_type {
            OptimizerType::Lbfgs => Optimizer::Lbfgs(Lbfgs::new(config)),
            OptimizerType::Tron => Optimizer::Tron(Tron::new(config)),
        }
    }

    pub fn optimizer_type(&self) -> OptimizerType {
        match self {
            Optimizer::Lbfgs(_) => OptimizerType::Lbfgs,
            Optimizer::Tron(_) => OptimizerType::Tron,
        }
    }

    pub fn optimize<F: TwiceDiffObjective>(
        &mut self,
        objective: &F,
        data: &F::Data,
        initial: Option<ArrayView1<f64>>,
    ) -> Result<(Array1<f64>, f64)> {
        match self {
            Optimizer::Lbfgs(o) => o.optimize(objective, data, initial),
            Optimizer::Tron(o) => o.optimize(objective, data, initial),
        }
    }

    pub fn states_tracker(&self) -> Option<&OptimizationStatesTracker> {
        match self {
            Optimizer::Lbfgs(o) => o.states_tracker(),
            Optimizer::Tron(o) => o.states_tracker(),
        }
    }

    pub fn set_reuse_previous_initial_state(&mut self, reuse: bool) {
        match self {
            Optimizer::Lbfgs(o) => o.set_reuse_previous_initial_state(reuse),
            Optimizer::Tron(o) => o.set_reuse_previous_initial_state(reuse),
        }
    }

    pub fn is_reusing_previous_initial_state(&self) -> bool {
        match self {
            Optimizer::Lbfgs(o) => o.is_reusing_previous_initial_state(),
            Optimizer::Tron(o) => o.is_reusing_previous_initial_state(),
        }
    }
}
