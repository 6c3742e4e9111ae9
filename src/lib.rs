//! glmix: generalized additive mixed-effect (GAME) model training for Rust.
//!
//! A GAME model is the sum of a global ("fixed effect") generalized linear
//! model and any number of per-entity ("random effect") models, optionally
//! with a shared low-rank latent factor. Models are trained jointly by
//! Gauss-Seidel coordinate descent; each coordinate is solved by LBFGS or
//! TRON against a GLM objective that runs either data-parallel over
//! partitions or sequentially over one entity's slice.
//!
//! # Example
//!
//! ```ignore
//! use glmix::training::{GameEstimator, GameTrainingConfig};
//!
//! let config = GameTrainingConfig::builder()
//!     .task(TaskType::LogisticRegression)
//!     .coordinates(coordinates)
//!     .update_sequence(vec!["global".into(), "per-user".into()])
//!     .build()?;
//! let results = GameEstimator::new().fit(&train, Some(&validation), &[config])?;
//! let best = GameEstimator::select_best(&results);
//! ```

pub mod coordinate;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod function;
pub mod model;
pub mod optimization;
pub mod projection;
pub mod testing;
pub mod training;
pub mod utils;

pub use error::{ConfigError, GameError, Result};

pub use data::{GameDataset, GameDatum, LabeledPoint, Scores, SparseVector, TrainingData};
pub use model::{GameModel, GeneralizedLinearModel, TaskType};
pub use optimization::{ConvergenceReason, OptimizerConfig, OptimizerType};
pub use training::{CoordinateDescent, GameEstimator, GameTrainingConfig};
pub use utils::Parallelism;
