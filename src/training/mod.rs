//! GAME training.
//!
//! - [`GameTrainingConfig`]: coordinates, update order and run settings
//! - [`CoordinateDescent`]: the Gauss-Seidel driver over coordinates
//! - [`GameEstimator`]: one trained model per configuration, with selection
//! - [`EarlyStopping`]: stops when the validation metric plateaus
//! - [`TrainingLogger`]: round-level logging with verbosity levels

mod callback;
mod config;
mod coordinate_descent;
mod estimator;
mod logger;

pub use callback::{EarlyStopAction, EarlyStopping};
pub use config::GameTrainingConfig;
pub use coordinate_descent::{CoordinateDescent, CoordinateDescentResult, CoordinateDescentState, RoundSummary};
pub use estimator::{GameEstimator, GameResult};
pub use logger::{TrainingLogger, Verbosity};
