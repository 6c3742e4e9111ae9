//! Training data representations.
//!
//! # Overview
//!
//! Data arrives as a [`GameDataset`]: a vector of [`GameDatum`] with named
//! sparse feature shards and entity ids. Coordinates view it through
//! [`FixedEffectDataset`], [`RandomEffectDataset`], or
//! [`RandomEffectDatasetInProjectedSpace`], and hand [`TrainingData`]
//! (a slice of [`LabeledPoint`] plus a dimension) to the optimizers.
//!
//! Coordinates exchange per-example [`Scores`], indexed by each example's
//! position in the dataset.

mod cache;
mod dataset;
mod datum;
mod normalization;
mod point;
mod sampling;
mod scores;
mod sparse;

pub use cache::{CacheHandle, DatasetCache};
pub use dataset::{
    EntityRows, FixedEffectDataset, ProjectedEntity, RandomEffectDataset,
    RandomEffectDatasetInProjectedSpace,
};
pub use datum::{GameDataset, GameDatum, ShardInfo};
pub use normalization::{FeatureSummary, NormalizationContext, NormalizationType};
pub use point::{LabeledPoint, TrainingData};
pub use sampling::{DownSampler, DownSamplerType};
pub use scores::Scores;
pub use sparse::SparseVector;
