//! Raw GAME examples and the dataset they form.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::SparseVector;
use crate::error::{ConfigError, GameError, Result};

// =============================================================================
// GameDatum
// =============================================================================

/// One scoring/training unit as delivered by the ingestion layer.
///
/// Features are grouped into named shards (one coordinate reads one shard);
/// `ids` maps an id type such as `"userId"` to the entity the example belongs to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameDatum {
    pub response: f64,
    pub offset: Option<f64>,
    pub weight: Option<f64>,
    pub features: HashMap<String, Arc<SparseVector>>,
    pub ids: HashMap<String, String>,
}

impl GameDatum {
    pub fn new(response: f64) -> Self {
        Self {
            response,
            ..Default::default()
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_features(mut self, shard: impl Into<String>, features: SparseVector) -> Self {
        self.features.insert(shard.into(), Arc::new(features));
        self
    }

    pub fn with_id(mut self, id_type: impl Into<String>, id: impl Into<String>) -> Self {
        self.ids.insert(id_type.into(), id.into());
        self
    }

    #[inline]
    pub fn offset_or_zero(&self) -> f64 {
        self.offset.unwrap_or(0.0)
    }

    #[inline]
    pub fn weight_or_one(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }

    /// Entity id for `id_type`. `uid` identifies the example in the error.
    pub fn id(&self, id_type: &str, uid: usize) -> Result<&str> {
        self.ids
            .get(id_type)
            .map(String::as_str)
            .ok_or_else(|| GameError::MissingIdType {
                id_type: id_type.to_string(),
                uid,
            })
    }

    /// Features of `shard`. `uid` identifies the example in the error.
    pub fn shard(&self, shard: &str, uid: usize) -> Result<&Arc<SparseVector>> {
        self.features
            .get(shard)
            .ok_or_else(|| GameError::MissingFeatureShard {
                shard: shard.to_string(),
                uid,
            })
    }
}

// =============================================================================
// GameDataset
// =============================================================================

/// Metadata for one feature shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Size of the shard's feature space.
    pub dimension: usize,
    /// Index of the constant 1.0 intercept feature, if the shard has one.
    pub intercept_index: Option<usize>,
}

impl ShardInfo {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            intercept_index: None,
        }
    }

    /// Shard whose last index is the intercept.
    pub fn with_intercept(dimension: usize) -> Self {
        Self {
            dimension,
            intercept_index: dimension.checked_sub(1),
        }
    }
}

/// A validated collection of [`GameDatum`] plus shard metadata.
///
/// Example position in `data` is the example's unique id; all [`Scores`](super::Scores)
/// produced against this dataset are indexed the same way.
#[derive(Debug, Clone)]
pub struct GameDataset {
    data: Vec<GameDatum>,
    shards: BTreeMap<String, ShardInfo>,
}

impl GameDataset {
    /// Validates weights and every present feature index against its shard dimension.
    pub fn new(data: Vec<GameDatum>, shards: BTreeMap<String, ShardInfo>) -> Result<Self> {
        for (name, info) in &shards {
            if let Some(intercept) = info.intercept_index {
                if intercept >= info.dimension {
                    return Err(GameError::DimensionMismatch {
                        expected: info.dimension,
                        got: intercept + 1,
                    });
                }
            }
            log::trace!("shard '{name}': dimension {}", info.dimension);
        }

        for (uid, datum) in data.iter().enumerate() {
            if let Some(w) = datum.weight {
                if !w.is_finite() || w < 0.0 {
                    return Err(GameError::Data(format!(
                        "example {uid} has invalid weight {w}"
                    )));
                }
            }
            for (shard, features) in &datum.features {
                let info = shards
                    .get(shard)
                    .ok_or_else(|| ConfigError::UnknownFeatureShard(shard.clone()))?;
                if let Some(max) = features.max_index() {
                    if max >= info.dimension {
                        return Err(GameError::DimensionMismatch {
                            expected: info.dimension,
                            got: max + 1,
                        });
                    }
                }
            }
        }

        Ok(Self { data, shards })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[GameDatum] {
        &self.data
    }

    pub fn shards(&self) -> &BTreeMap<String, ShardInfo> {
        &self.shards
    }

    pub fn shard(&self, name: &str) -> Result<ShardInfo> {
        self.shards
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownFeatureShard(name.to_string()).into())
    }

    pub fn responses(&self) -> Array1<f64> {
        self.data.iter().map(|d| d.response).collect()
    }

    pub fn offsets(&self) -> Array1<f64> {
        self.data.iter().map(GameDatum::offset_or_zero).collect()
    }

    pub fn weights(&self) -> Array1<f64> {
        self.data.iter().map(GameDatum::weight_or_one).collect()
    }
}
