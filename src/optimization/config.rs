//! Optimizer and per-coordinate optimization configuration.
//!
//! Both configs use `bon` builders with a validating `build()`:
//!
//! ```
//! use glmix::optimization::{OptimizerConfig, OptimizerType};
//!
//! let config = OptimizerConfig::builder()
//!     .optimizer_type(OptimizerType::Tron)
//!     .max_iterations(50)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.tolerance, 1e-7);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use bon::Builder;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::function::RegularizationContext;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizerType {
    #[default]
    Lbfgs,
    Tron,
}

impl fmt::Display for OptimizerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerType::Lbfgs => f.write_str("LBFGS"),
            OptimizerType::Tron => f.write_str("TRON"),
        }
    }
}

/// Per-coefficient variance estimate computed after optimization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VarianceComputationType {
    #[default]
    None,
    /// `1 / H_ii`.
    Simple,
    /// Diagonal of `H^-1`.
    Full,
}

// =============================================================================
// BoxConstraints
// =============================================================================

/// Inclusive `(lower, upper)` bounds per coefficient index.
///
/// Indices without an entry are unbounded; infinite bounds are allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxConstraints(BTreeMap<usize, (f64, f64)>);

impl BoxConstraints {
    pub fn new(bounds: BTreeMap<usize, (f64, f64)>) -> Result<Self, ConfigError> {
        for (&index, &(lower, upper)) in &bounds {
            if lower.is_nan() || upper.is_nan() || lower > upper {
                return Err(ConfigError::InvalidBounds { index, lower, upper });
            }
        }
        Ok(Self(bounds))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bounds(&self) -> &BTreeMap<usize, (f64, f64)> {
        &self.0
    }

    /// Clip every bounded coefficient into its interval.
    pub fn project(&self, coefficients: &mut Array1<f64>) {
        for (&i, &(lower, upper)) in &self.0 {
            if let Some(w) = coefficients.get_mut(i) {
                *w = w.clamp(lower, upper);
            }
        }
    }

    /// Gradient with components that point out of an active bound zeroed.
    pub fn projected_gradient(&self, coefficients: ArrayView1<f64>, gradient: ArrayView1<f64>) -> Array1<f64> {
        let free = self.free_variables(coefficients, gradient);
        let mut projected = gradient.to_owned();
        for (g, keep) in projected.iter_mut().zip(free) {
            if !keep {
                *g = 0.0;
            }
        }
        projected
    }

    /// `false` where a coefficient sits on a bound and descent would leave the box.
    pub fn free_variables(&self, coefficients: ArrayView1<f64>, gradient: ArrayView1<f64>) -> Vec<bool> {
        let mut free = vec![true; gradient.len()];
        for (&i, &(lower, upper)) in &self.0 {
            if i >= free.len() {
                continue;
            }
            let (w, g) = (coefficients[i], gradient[i]);
            if (w <= lower && g > 0.0) || (w >= upper && g < 0.0) {
                free[i] = false;
            }
        }
        free
    }

    /// The same bounds with every index passed through `map`; indices it drops are unbounded.
    pub fn remap(&self, map: impl Fn(usize) -> Option<usize>) -> Self {
        Self(self.0.iter().filter_map(|(&i, &b)| map(i).map(|j| (j, b))).collect())
    }

    /// Whether every bounded coefficient lies in its interval.
    pub fn is_satisfied(&self, coefficients: ArrayView1<f64>) -> bool {
        self.0.iter().all(|(&i, &(lower, upper))| {
            coefficients.get(i).map_or(true, |&w| lower <= w && w <= upper)
        })
    }
}

// =============================================================================
// OptimizerConfig
// =============================================================================

/// Settings of one optimizer.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct OptimizerConfig {
    /// Default: LBFGS.
    #[builder(default)]
    pub optimizer_type: OptimizerType,

    /// Default: 100.
    #[builder(default = 100)]
    pub max_iterations: usize,

    /// Convergence tolerance for both the relative function change and the
    /// gradient norm. Default: 1e-7.
    #[builder(default = 1e-7)]
    pub tolerance: f64,

    /// Box constraints (LBFGS only).
    pub box_constraints: Option<BoxConstraints>,

    /// Number of curvature pairs LBFGS keeps. Default: 10.
    #[builder(default = 10)]
    pub history_size: usize,

    /// Conjugate-gradient steps per TRON iteration. Default: 20.
    #[builder(default = 20)]
    pub max_cg_iterations: usize,
}

impl<S: optimizer_config_builder::IsComplete> OptimizerConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero iteration cap, history size or CG
    /// budget, a non-positive tolerance, or box constraints given to TRON.
    pub fn build(self) -> Result<OptimizerConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl OptimizerConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("max_iterations", self.max_iterations),
            ("history_size", self.history_size),
            ("max_cg_iterations", self.max_cg_iterations),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        if self.optimizer_type == OptimizerType::Tron
            && self.box_constraints.as_ref().is_some_and(|b| !b.is_empty())
        {
            return Err(ConfigError::ConstraintsRequireLbfgs);
        }
        Ok(())
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}

// =============================================================================
// GlmOptimizationConfig
// =============================================================================

/// Optimizer plus regularization for one coordinate's GLM problems.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct GlmOptimizationConfig {
    #[builder(default)]
    pub optimizer: OptimizerConfig,

    /// Default: none.
    #[builder(default)]
    pub regularization: RegularizationContext,

    /// Regularization weight `lambda`. Default: 0.
    #[builder(default = 0.0)]
    pub regularization_weight: f64,
}

impl<S: glm_optimization_config_builder::IsComplete> GlmOptimizationConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<GlmOptimizationConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl GlmOptimizationConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.optimizer.validate()?;
        if !(self.regularization_weight.is_finite() && self.regularization_weight >= 0.0) {
            return Err(ConfigError::InvalidRegularization {
                field: "regularization_weight",
                value: self.regularization_weight,
            });
        }
        Ok(())
    }

    pub fn has_box_constraints(&self) -> bool {
        self.optimizer.box_constraints.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Short form used in model descriptors.
    pub fn descriptor(&self) -> String {
        format!(
            "{}(max_iter={},tol={:e}),{:?}(lambda={})",
            self.optimizer.optimizer_type,
            self.optimizer.max_iterations,
            self.optimizer.tolerance,
            self.regularization.kind(),
            self.regularization_weight
        )
    }
}

impl Default for GlmOptimizationConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}
