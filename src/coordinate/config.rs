//! Per-coordinate configuration.

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::optimization::GlmOptimizationConfig;
use crate::projection::ProjectorType;

/// A global model over one feature shard.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct FixedEffectConfig {
    #[builder(into)]
    pub feature_shard_id: String,

    #[builder(default)]
    pub optimization: GlmOptimizationConfig,

    /// Fraction of examples kept per round, in `(0, 1]`. Default: 1.
    #[builder(default = 1.0)]
    pub down_sampling_rate: f64,
}

impl<S: fixed_effect_config_builder::IsComplete> FixedEffectConfigBuilder<S> {
    pub fn build(self) -> Result<FixedEffectConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl FixedEffectConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.optimization.validate()?;
        if !(self.down_sampling_rate > 0.0 && self.down_sampling_rate <= 1.0) {
            return Err(ConfigError::InvalidSamplingRate(self.down_sampling_rate));
        }
        Ok(())
    }
}

/// One model per entity of `random_effect_type`.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct RandomEffectConfig {
    /// Id type that groups examples into entities, e.g. `"userId"`.
    #[builder(into)]
    pub random_effect_type: String,

    #[builder(into)]
    pub feature_shard_id: String,

    #[builder(default)]
    pub optimization: GlmOptimizationConfig,

    /// Cap on the examples each entity trains on. Default: no cap.
    pub active_data_upper_bound: Option<usize>,

    /// Default: index map.
    #[builder(default)]
    pub projector: ProjectorType,
}

impl<S: random_effect_config_builder::IsComplete> RandomEffectConfigBuilder<S> {
    pub fn build(self) -> Result<RandomEffectConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl RandomEffectConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.optimization.validate()?;
        if self.active_data_upper_bound == Some(0) {
            return Err(ConfigError::InvalidCount {
                field: "active_data_upper_bound",
                value: 0,
            });
        }
        if let ProjectorType::Random { dimension: 0 } = self.projector {
            return Err(ConfigError::InvalidCount {
                field: "projector.dimension",
                value: 0,
            });
        }
        if matches!(self.projector, ProjectorType::Random { .. }) && self.optimization.has_box_constraints() {
            return Err(ConfigError::Conflict(
                "box constraints need an identity or index-map projector".into(),
            ));
        }
        Ok(())
    }
}

/// Per-entity models in a shared learned latent space.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(derive(Clone, Debug), finish_fn(vis = "", name = __build_internal))]
pub struct FactoredRandomEffectConfig {
    /// Entity grouping, shard and per-entity optimization. The projector is unused.
    pub random_effect: RandomEffectConfig,

    /// Optimization of the latent projection matrix.
    #[builder(default)]
    pub latent_factor: GlmOptimizationConfig,

    /// Rows of the latent projection. Default: 4.
    #[builder(default = 4)]
    pub latent_dim: usize,

    /// Entity/latent alternations per update. Default: 1.
    #[builder(default = 1)]
    pub inner_iterations: usize,
}

impl<S: factored_random_effect_config_builder::IsComplete> FactoredRandomEffectConfigBuilder<S> {
    pub fn build(self) -> Result<FactoredRandomEffectConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl FactoredRandomEffectConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.random_effect.validate()?;
        self.latent_factor.validate()?;
        if self.random_effect.optimization.has_box_constraints() || self.latent_factor.has_box_constraints() {
            return Err(ConfigError::Conflict(
                "box constraints are not supported in a latent space".into(),
            ));
        }
        for (field, value) in [("latent_dim", self.latent_dim), ("inner_iterations", self.inner_iterations)] {
            if value == 0 {
                return Err(ConfigError::InvalidCount { field, value });
            }
        }
        Ok(())
    }
}

/// Configuration of one coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateConfig {
    FixedEffect(FixedEffectConfig),
    RandomEffect(RandomEffectConfig),
    FactoredRandomEffect(FactoredRandomEffectConfig),
}

impl CoordinateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CoordinateConfig::FixedEffect(c) => c.validate(),
            CoordinateConfig::RandomEffect(c) => c.validate(),
            CoordinateConfig::FactoredRandomEffect(c) => c.validate(),
        }
    }

    pub fn feature_shard_id(&self) -> &str {
        match self {
            CoordinateConfig::FixedEffect(c) => &c.feature_shard_id,
            CoordinateConfig::RandomEffect(c) => &c.feature_shard_id,
            CoordinateConfig::FactoredRandomEffect(c) => &c.random_effect.feature_shard_id,
        }
    }

    /// Short form used in model descriptors.
    pub fn descriptor(&self) -> String {
        match self {
            CoordinateConfig::FixedEffect(c) => {
                let mut d = format!("fixed[{}]{}", c.feature_shard_id, c.optimization.descriptor());
                if c.down_sampling_rate < 1.0 {
                    d.push_str(&format!(",rate={}", c.down_sampling_rate));
                }
                d
            }
            CoordinateConfig::RandomEffect(c) => format!(
                "random[{}:{}]{}",
                c.random_effect_type,
                c.feature_shard_id,
                c.optimization.descriptor()
            ),
            CoordinateConfig::FactoredRandomEffect(c) => format!(
                "factored[{}:{}]{},latent(k={},inner={}){}",
                c.random_effect.random_effect_type,
                c.random_effect.feature_shard_id,
                c.random_effect.optimization.descriptor(),
                c.latent_dim,
                c.inner_iterations,
                c.latent_factor.descriptor()
            ),
        }
    }
}

impl From<FixedEffectConfig> for CoordinateConfig {
    fn from(config: FixedEffectConfig) -> Self {
        CoordinateConfig::FixedEffect(config)
    }
}

impl From<RandomEffectConfig> for CoordinateConfig {
    fn from(config: RandomEffectConfig) -> Self {
        CoordinateConfig::RandomEffect(config)
    }
}

impl From<FactoredRandomEffectConfig> for CoordinateConfig {
    fn from(config: FactoredRandomEffectConfig) -> Self {
        CoordinateConfig::FactoredRandomEffect(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_rate_validated() {
        assert_eq!(
            FixedEffectConfig::builder()
                .feature_shard_id("g")
                .down_sampling_rate(0.0)
                .build()
                .unwrap_err(),
            ConfigError::InvalidSamplingRate(0.0)
        );
        assert!(FixedEffectConfig::builder().feature_shard_id("g").build().is_ok());
    }

    #[test]
    fn random_effect_counts_validated() {
        let err = RandomEffectConfig::builder()
            .random_effect_type("userId")
            .feature_shard_id("u")
            .active_data_upper_bound(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCount { field: "active_data_upper_bound", .. }));

        let err = RandomEffectConfig::builder()
            .random_effect_type("userId")
            .feature_shard_id("u")
            .projector(ProjectorType::Random { dimension: 0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCount { .. }));
    }

    #[test]
    fn zero_latent_dimension_rejected() {
        let random_effect = RandomEffectConfig::builder()
            .random_effect_type("userId")
            .feature_shard_id("u")
            .build()
            .unwrap();
        let err = FactoredRandomEffectConfig::builder()
            .random_effect(random_effect)
            .latent_dim(0)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidCount { field: "latent_dim", value: 0 });
    }

    #[test]
    fn descriptor_names_shard_and_optimizer() {
        let config: CoordinateConfig = FixedEffectConfig::builder()
            .feature_shard_id("global")
            .down_sampling_rate(0.5)
            .build()
            .unwrap()
            .into();
        let d = config.descriptor();
        assert!(d.starts_with("fixed[global]LBFGS"));
        assert!(d.ends_with("rate=0.5"));
    }
}
