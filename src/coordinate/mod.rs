//! Coordinates: one block of a GAME model and the data it trains on.
//!
//! A coordinate owns its dataset view and its optimization problem(s). Given
//! the residual scores of every other coordinate it re-optimizes its own
//! model and returns that model's per-example scores.
//!
//! - [`FixedEffectCoordinate`]: one distributed problem over all examples.
//! - [`RandomEffectCoordinate`]: one single-node problem per entity.
//! - [`FactoredRandomEffectCoordinate`]: per-entity latent models alternating
//!   with a shared latent projection.
//!
//! Which coordinate is built follows from the [`CoordinateDataset`] variant,
//! which carries the configuration it was built from.

mod config;
mod factored;
mod fixed;
mod random;

use serde::{Deserialize, Serialize};

pub use config::{CoordinateConfig, FactoredRandomEffectConfig, FixedEffectConfig, RandomEffectConfig};
pub use factored::FactoredRandomEffectCoordinate;
pub use fixed::FixedEffectCoordinate;
pub use random::RandomEffectCoordinate;

use crate::data::{
    FixedEffectDataset, GameDataset, NormalizationType, RandomEffectDataset, RandomEffectDatasetInProjectedSpace,
    Scores,
};
use crate::error::{GameError, Result};
use crate::model::{DatumScoringModel, TaskType};
use crate::optimization::VarianceComputationType;
use crate::utils::Parallelism;

/// Settings shared by every coordinate of one training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSettings {
    pub task: TaskType,
    pub variance: VarianceComputationType,
    /// Applied to fixed-effect coordinates only.
    pub normalization: NormalizationType,
    pub tree_aggregate_depth: usize,
    pub n_partitions: Option<usize>,
    pub seed: u64,
    pub parallelism: Parallelism,
}

impl CoordinateSettings {
    pub fn new(task: TaskType) -> Self {
        Self {
            task,
            variance: VarianceComputationType::None,
            normalization: NormalizationType::None,
            tree_aggregate_depth: 2,
            n_partitions: None,
            seed: 42,
            parallelism: Parallelism::Parallel,
        }
    }

    /// Seed for one coordinate, stable under reordering of the update sequence.
    pub(crate) fn coordinate_seed(&self, coordinate_id: &str) -> u64 {
        coordinate_id
            .bytes()
            .fold(self.seed ^ 0xCBF2_9CE4_8422_2325, |h, b| {
                (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01B3)
            })
    }
}

// =============================================================================
// CoordinateDataset
// =============================================================================

/// The dataset view a coordinate trains on, tagged with the configuration it was built for.
///
/// The view and the configuration come from one variant, so every dataset
/// meets exactly the coordinate it can train.
#[derive(Debug, Clone)]
pub enum CoordinateDataset {
    FixedEffect(FixedEffectDataset, FixedEffectConfig),
    RandomEffect(RandomEffectDatasetInProjectedSpace, RandomEffectConfig),
    /// Raw entity grouping; the coordinate projects through its latent matrix.
    FactoredRandomEffect(RandomEffectDataset, FactoredRandomEffectConfig),
}

impl CoordinateDataset {
    /// Build the view `config` needs.
    pub fn build(dataset: &GameDataset, config: &CoordinateConfig, seed: u64) -> Result<Self> {
        if dataset.is_empty() {
            return Err(GameError::EmptyDataset("training data has no examples".into()));
        }
        Ok(match config {
            CoordinateConfig::FixedEffect(c) => {
                CoordinateDataset::FixedEffect(FixedEffectDataset::new(dataset, &c.feature_shard_id)?, c.clone())
            }
            CoordinateConfig::RandomEffect(c) => {
                let base = RandomEffectDataset::new(
                    dataset,
                    &c.random_effect_type,
                    &c.feature_shard_id,
                    c.active_data_upper_bound,
                    seed,
                )?;
                CoordinateDataset::RandomEffect(
                    RandomEffectDatasetInProjectedSpace::build(base, c.projector, seed),
                    c.clone(),
                )
            }
            CoordinateConfig::FactoredRandomEffect(c) => {
                let re = &c.random_effect;
                let base = RandomEffectDataset::new(
                    dataset,
                    &re.random_effect_type,
                    &re.feature_shard_id,
                    re.active_data_upper_bound,
                    seed,
                )?;
                CoordinateDataset::FactoredRandomEffect(base, c.clone())
            }
        })
    }

    pub fn len(&self) -> usize {
        match self {
            CoordinateDataset::FixedEffect(d, _) => d.len(),
            CoordinateDataset::RandomEffect(d, _) => d.base().len(),
            CoordinateDataset::FactoredRandomEffect(d, _) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Coordinate
// =============================================================================

/// A trainable block of a GAME model.
#[derive(Debug)]
pub enum Coordinate {
    FixedEffect(FixedEffectCoordinate),
    RandomEffect(RandomEffectCoordinate),
    FactoredRandomEffect(FactoredRandomEffectCoordinate),
}

impl Coordinate {
    /// Build the coordinate a dataset view was made for.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for an invalid configuration;
    /// [`GameError::UnsupportedCombination`] when the task cannot run the
    /// configured optimization.
    ///
    /// [`ConfigError`]: crate::ConfigError
    pub fn build(id: impl Into<String>, dataset: CoordinateDataset, settings: &CoordinateSettings) -> Result<Self> {
        let id = id.into();
        match dataset {
            CoordinateDataset::FixedEffect(d, c) => {
                c.validate()?;
                FixedEffectCoordinate::new(id, d, &c, settings).map(Coordinate::FixedEffect)
            }
            CoordinateDataset::RandomEffect(d, c) => {
                c.validate()?;
                RandomEffectCoordinate::new(id, d, &c, settings).map(Coordinate::RandomEffect)
            }
            CoordinateDataset::FactoredRandomEffect(d, c) => {
                c.validate()?;
                FactoredRandomEffectCoordinate::new(id, d, &c, settings).map(Coordinate::FactoredRandomEffect)
            }
        }
    }

    /// Build the dataset view and the coordinate in one step.
    pub fn from_dataset(
        id: impl Into<String>,
        dataset: &GameDataset,
        config: &CoordinateConfig,
        settings: &CoordinateSettings,
    ) -> Result<Self> {
        let id = id.into();
        config.validate()?;
        let view = CoordinateDataset::build(dataset, config, settings.coordinate_seed(&id))?;
        Self::build(id, view, settings)
    }

    pub fn id(&self) -> &str {
        match self {
            Coordinate::FixedEffect(c) => c.id(),
            Coordinate::RandomEffect(c) => c.id(),
            Coordinate::FactoredRandomEffect(c) => c.id(),
        }
    }

    /// The model a coordinate starts from: zero coefficients, no entity models.
    pub fn initial_model(&self) -> DatumScoringModel {
        match self {
            Coordinate::FixedEffect(c) => DatumScoringModel::FixedEffect(c.initial_model()),
            Coordinate::RandomEffect(c) => DatumScoringModel::RandomEffect(c.initial_model()),
            Coordinate::FactoredRandomEffect(c) => DatumScoringModel::FactoredRandomEffect(c.initial_model()),
        }
    }

    /// Re-optimize this coordinate's model against `residual`, the summed
    /// scores of every other coordinate.
    ///
    /// # Errors
    ///
    /// [`GameError::ModelMismatch`] if `model` belongs to another kind of
    /// coordinate; [`GameError::DimensionMismatch`] if `residual` does not
    /// cover the training data.
    pub fn update_model(
        &mut self,
        model: &DatumScoringModel,
        residual: &Scores,
        round: usize,
    ) -> Result<(DatumScoringModel, Scores)> {
        match (self, model) {
            (Coordinate::FixedEffect(c), DatumScoringModel::FixedEffect(m)) => c
                .update_model(m, residual, round)
                .map(|(m, s)| (DatumScoringModel::FixedEffect(m), s)),
            (Coordinate::RandomEffect(c), DatumScoringModel::RandomEffect(m)) => c
                .update_model(m, residual, round)
                .map(|(m, s)| (DatumScoringModel::RandomEffect(m), s)),
            (Coordinate::FactoredRandomEffect(c), DatumScoringModel::FactoredRandomEffect(m)) => c
                .update_model(m, residual, round)
                .map(|(m, s)| (DatumScoringModel::FactoredRandomEffect(m), s)),
            (c, _) => Err(GameError::ModelMismatch(c.id().to_string())),
        }
    }

    /// Scores of `model` on this coordinate's training data.
    pub fn score(&self, model: &DatumScoringModel) -> Result<Scores> {
        match (self, model) {
            (Coordinate::FixedEffect(c), DatumScoringModel::FixedEffect(m)) => Ok(c.score(m)),
            (Coordinate::RandomEffect(c), DatumScoringModel::RandomEffect(m)) => Ok(c.score(m)),
            (Coordinate::FactoredRandomEffect(c), DatumScoringModel::FactoredRandomEffect(m)) => Ok(c.score(m)),
            (c, _) => Err(GameError::ModelMismatch(c.id().to_string())),
        }
    }

    /// Regularization term `model` contributes to the training objective.
    pub fn regularization_term_value(&self, model: &DatumScoringModel) -> Result<f64> {
        match (self, model) {
            (Coordinate::FixedEffect(c), DatumScoringModel::FixedEffect(m)) => Ok(c.regularization_term_value(m)),
            (Coordinate::RandomEffect(c), DatumScoringModel::RandomEffect(m)) => Ok(c.regularization_term_value(m)),
            (Coordinate::FactoredRandomEffect(c), DatumScoringModel::FactoredRandomEffect(m)) => {
                Ok(c.regularization_term_value(m))
            }
            (c, _) => Err(GameError::ModelMismatch(c.id().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FixedEffectModel, GeneralizedLinearModel};
    use crate::testing::{mixed_effect_dataset, ENTITY_ID_TYPE, ENTITY_SHARD, GLOBAL_SHARD};

    fn dataset() -> GameDataset {
        mixed_effect_dataset(TaskType::LinearRegression, 4, 10, 2, 3).unwrap()
    }

    fn fixed() -> CoordinateConfig {
        FixedEffectConfig::builder()
            .feature_shard_id(GLOBAL_SHARD)
            .build()
            .unwrap()
            .into()
    }

    fn random() -> CoordinateConfig {
        RandomEffectConfig::builder()
            .random_effect_type(ENTITY_ID_TYPE)
            .feature_shard_id(ENTITY_SHARD)
            .build()
            .unwrap()
            .into()
    }

    #[test]
    fn dataset_variant_follows_config() {
        let data = dataset();
        assert!(matches!(
            CoordinateDataset::build(&data, &fixed(), 0).unwrap(),
            CoordinateDataset::FixedEffect(..)
        ));
        let view = CoordinateDataset::build(&data, &random(), 0).unwrap();
        assert!(matches!(view, CoordinateDataset::RandomEffect(..)));
        assert_eq!(view.len(), data.len());

        let settings = CoordinateSettings::new(TaskType::LinearRegression);
        let coordinate = Coordinate::build("re", view, &settings).unwrap();
        assert!(matches!(coordinate, Coordinate::RandomEffect(_)));
    }

    #[test]
    fn invalid_config_rejected_before_building_data() {
        let data = dataset();
        let settings = CoordinateSettings::new(TaskType::LinearRegression);
        let mut config = RandomEffectConfig::builder()
            .random_effect_type(ENTITY_ID_TYPE)
            .feature_shard_id(ENTITY_SHARD)
            .build()
            .unwrap();
        config.active_data_upper_bound = Some(0);
        let err = Coordinate::from_dataset("re", &data, &config.into(), &settings).unwrap_err();
        assert!(matches!(err, GameError::Config(crate::ConfigError::InvalidCount { .. })));
    }

    #[test]
    fn model_of_other_kind_rejected() {
        let data = dataset();
        let settings = CoordinateSettings::new(TaskType::LinearRegression);
        let mut re = Coordinate::from_dataset("re", &data, &random(), &settings).unwrap();
        let foreign = DatumScoringModel::FixedEffect(FixedEffectModel::new(
            GLOBAL_SHARD,
            GeneralizedLinearModel::zeros(TaskType::LinearRegression, 3),
        ));
        let residual = Scores::zeros(data.len());
        assert!(matches!(
            re.update_model(&foreign, &residual, 0),
            Err(GameError::ModelMismatch(id)) if id == "re"
        ));
    }

    #[test]
    fn coordinate_seed_depends_on_id() {
        let settings = CoordinateSettings::new(TaskType::LinearRegression);
        assert_eq!(settings.coordinate_seed("a"), settings.coordinate_seed("a"));
        assert_ne!(settings.coordinate_seed("a"), settings.coordinate_seed("b"));
    }
}
