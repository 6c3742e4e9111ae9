//! Trained models.
//!
//! A [`GameModel`] maps coordinate ids to [`DatumScoringModel`]s; each of
//! those is built from one or more [`GeneralizedLinearModel`]s.

mod game;
mod glm;
mod task;

pub use game::{DatumScoringModel, FactoredRandomEffectModel, FixedEffectModel, GameModel, RandomEffectModel};
pub(crate) use game::latent_features;
pub use glm::{Coefficients, GeneralizedLinearModel};
pub use task::TaskType;
