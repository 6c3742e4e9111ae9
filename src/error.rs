//! Error types.
//!
//! Two enums cover every failure the crate reports:
//!
//! - [`ConfigError`]: invalid or conflicting settings, raised by the
//!   validated `build()` of the configuration builders before any training work starts.
//! - [`GameError`]: everything else (unsupported task/operation combinations,
//!   malformed input data, dimension mismatches).
//!
//! Optimizer non-convergence is deliberately absent: hitting the iteration cap
//! is a [`ConvergenceReason`](crate::optimization::ConvergenceReason), not an error.

use crate::model::TaskType;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GameError>;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("update sequence must name at least one coordinate")]
    EmptyUpdateSequence,

    #[error("update sequence references unknown coordinate '{0}'")]
    UnknownCoordinate(String),

    #[error("coordinate '{0}' appears more than once in the update sequence")]
    DuplicateCoordinate(String),

    #[error("{field} must be at least 1, got {value}")]
    InvalidCount { field: &'static str, value: usize },

    #[error("tolerance must be positive and finite, got {0}")]
    InvalidTolerance(f64),

    #[error("down-sampling rate must be in (0, 1], got {0}")]
    InvalidSamplingRate(f64),

    #[error("{field} must be non-negative, got {value}")]
    InvalidRegularization { field: &'static str, value: f64 },

    #[error("invalid bounds for coefficient {index}: lower {lower} > upper {upper}")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },

    #[error("box constraints are only supported by the LBFGS optimizer")]
    ConstraintsRequireLbfgs,

    #[error("unknown evaluator '{0}'")]
    UnknownEvaluator(String),

    #[error("normalization with shifts requires an intercept in feature shard '{0}'")]
    ShiftWithoutIntercept(String),

    #[error("unknown feature shard '{0}'")]
    UnknownFeatureShard(String),

    #[error("conflicting settings: {0}")]
    Conflict(String),
}

// =============================================================================
// GameError
// =============================================================================

/// Errors raised while building datasets, coordinates, and models.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{operation} is not supported for task {task}")]
    UnsupportedCombination { task: TaskType, operation: String },

    #[error("duplicate feature index {index} in one example")]
    DuplicateFeature { index: usize },

    #[error("example {uid} is missing required id type '{id_type}'")]
    MissingIdType { id_type: String, uid: usize },

    #[error("example {uid} is missing feature shard '{shard}'")]
    MissingFeatureShard { shard: String, uid: usize },

    #[error("invalid data: {0}")]
    Data(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("coordinate '{0}' was handed a model of a different coordinate kind")]
    ModelMismatch(String),

    #[error("empty dataset: {0}")]
    EmptyDataset(String),
}

impl GameError {
    /// Shorthand for [`GameError::UnsupportedCombination`].
    pub fn unsupported(task: TaskType, operation: impl Into<String>) -> Self {
        Self::UnsupportedCombination {
            task,
            operation: operation.into(),
        }
    }
}
