//! Coordinate-level views of a [`GameDataset`].
//!
//! A fixed-effect coordinate trains on one global partition; a random-effect
//! coordinate trains one problem per entity. Both keep each example's base
//! offset and add the residual scores of the other coordinates at update time.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::ArrayView1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use super::{GameDataset, LabeledPoint, Scores, ShardInfo, TrainingData};
use crate::error::{GameError, Result};
use crate::projection::{IndexMapProjector, ProjectionMatrix, Projector, ProjectorType};

/// Build base labeled points for one shard (offset and weight from the datum).
fn shard_points(dataset: &GameDataset, shard_id: &str) -> Result<Vec<LabeledPoint>> {
    dataset
        .data()
        .iter()
        .enumerate()
        .map(|(uid, datum)| {
            LabeledPoint::with_offset_and_weight(
                datum.response,
                Arc::clone(datum.shard(shard_id, uid)?),
                datum.offset_or_zero(),
                datum.weight_or_one(),
            )
        })
        .collect()
}

fn check_residual(expected: usize, residual: &Scores) -> Result<()> {
    if residual.len() != expected {
        return Err(GameError::DimensionMismatch {
            expected,
            got: residual.len(),
        });
    }
    Ok(())
}

// =============================================================================
// FixedEffectDataset
// =============================================================================

/// All examples of a dataset, viewed through one feature shard.
#[derive(Debug, Clone)]
pub struct FixedEffectDataset {
    shard_id: String,
    shard: ShardInfo,
    points: Vec<LabeledPoint>,
}

impl FixedEffectDataset {
    pub fn new(dataset: &GameDataset, shard_id: &str) -> Result<Self> {
        let shard = dataset.shard(shard_id)?;
        let points = shard_points(dataset, shard_id)?;
        Ok(Self {
            shard_id: shard_id.to_string(),
            shard,
            points,
        })
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn shard(&self) -> ShardInfo {
        self.shard
    }

    pub fn dimension(&self) -> usize {
        self.shard.dimension
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[LabeledPoint] {
        &self.points
    }

    /// Training data whose offsets include the other coordinates' scores.
    pub fn with_residual(&self, residual: &Scores) -> Result<TrainingData> {
        check_residual(self.points.len(), residual)?;
        let points = self
            .points
            .iter()
            .zip(residual.view())
            .map(|(p, &r)| p.shifted(r))
            .collect();
        Ok(TrainingData::new_unchecked(points, self.shard.dimension))
    }

    /// `x . w` for every example, without offsets.
    pub fn score(&self, coefficients: ArrayView1<f64>) -> Scores {
        Scores::from_vec(
            self.points
                .par_iter()
                .map(|p| p.features().dot(coefficients))
                .collect(),
        )
    }
}

// =============================================================================
// RandomEffectDataset
// =============================================================================

/// Rows of one entity: every row is scored, `active` rows are trained on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRows {
    pub rows: Vec<usize>,
    pub active: Vec<usize>,
}

/// A dataset grouped by the entity id of one id type.
#[derive(Debug, Clone)]
pub struct RandomEffectDataset {
    random_effect_type: String,
    shard_id: String,
    shard: ShardInfo,
    points: Vec<LabeledPoint>,
    entities: BTreeMap<String, EntityRows>,
}

impl RandomEffectDataset {
    /// Group examples by `random_effect_type`.
    ///
    /// When `active_data_upper_bound` is set, entities with more rows train on a
    /// seeded random subset of that size; all rows are still scored.
    pub fn new(
        dataset: &GameDataset,
        random_effect_type: &str,
        shard_id: &str,
        active_data_upper_bound: Option<usize>,
        seed: u64,
    ) -> Result<Self> {
        let shard = dataset.shard(shard_id)?;
        let points = shard_points(dataset, shard_id)?;

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (uid, datum) in dataset.data().iter().enumerate() {
            let id = datum.id(random_effect_type, uid)?;
            groups.entry(id.to_string()).or_default().push(uid);
        }

        let entities = groups
            .into_iter()
            .enumerate()
            .map(|(position, (entity, rows))| {
                let active = match active_data_upper_bound {
                    Some(bound) if rows.len() > bound => {
                        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(position as u64));
                        let mut sampled = rows.clone();
                        sampled.shuffle(&mut rng);
                        sampled.truncate(bound);
                        sampled.sort_unstable();
                        sampled
                    }
                    _ => rows.clone(),
                };
                (entity, EntityRows { rows, active })
            })
            .collect();

        Ok(Self {
            random_effect_type: random_effect_type.to_string(),
            shard_id: shard_id.to_string(),
            shard,
            points,
            entities,
        })
    }

    pub fn random_effect_type(&self) -> &str {
        &self.random_effect_type
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn shard(&self) -> ShardInfo {
        self.shard
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[LabeledPoint] {
        &self.points
    }

    pub fn entities(&self) -> &BTreeMap<String, EntityRows> {
        &self.entities
    }

    pub fn n_entities(&self) -> usize {
        self.entities.len()
    }
}

// =============================================================================
// RandomEffectDatasetInProjectedSpace
// =============================================================================

/// One entity's active data, already projected.
#[derive(Debug, Clone)]
pub struct ProjectedEntity {
    pub projector: Projector,
    pub active_rows: Vec<usize>,
    pub points: Vec<LabeledPoint>,
}

impl ProjectedEntity {
    /// Per-round training data: base offsets plus the residual of each active row.
    pub fn with_residual(&self, residual: &Scores) -> TrainingData {
        let points = self
            .points
            .iter()
            .zip(&self.active_rows)
            .map(|(p, &row)| p.shifted(residual.get(row)))
            .collect();
        TrainingData::new_unchecked(points, self.projector.projected_dimension())
    }
}

/// A [`RandomEffectDataset`] whose entities train in a projected space.
#[derive(Debug, Clone)]
pub struct RandomEffectDatasetInProjectedSpace {
    base: RandomEffectDataset,
    entities: BTreeMap<String, ProjectedEntity>,
}

impl RandomEffectDatasetInProjectedSpace {
    pub fn build(base: RandomEffectDataset, projector_type: ProjectorType, seed: u64) -> Self {
        let dimension = base.shard.dimension;
        let intercept = base.shard.intercept_index;
        let shared = match projector_type {
            ProjectorType::Random { dimension: k } => Some(Arc::new(ProjectionMatrix::gaussian(
                k, dimension, intercept, seed,
            ))),
            _ => None,
        };

        let entities = base
            .entities
            .par_iter()
            .map(|(entity, rows)| {
                let projector = match (&shared, projector_type) {
                    (Some(matrix), _) => Projector::Random(Arc::clone(matrix)),
                    (None, ProjectorType::IndexMap) => Projector::IndexMap(IndexMapProjector::build(
                        dimension,
                        rows.active.iter().map(|&r| base.points[r].features()),
                        intercept,
                    )),
                    (None, _) => Projector::Identity { dimension },
                };
                let points = rows
                    .active
                    .iter()
                    .map(|&r| {
                        let p = &base.points[r];
                        p.with_features(Arc::new(projector.project_features(p.features())))
                    })
                    .collect();
                (
                    entity.clone(),
                    ProjectedEntity {
                        projector,
                        active_rows: rows.active.clone(),
                        points,
                    },
                )
            })
            .collect();

        Self { base, entities }
    }

    pub fn base(&self) -> &RandomEffectDataset {
        &self.base
    }

    pub fn entities(&self) -> &BTreeMap<String, ProjectedEntity> {
        &self.entities
    }

    pub fn check_residual(&self, residual: &Scores) -> Result<()> {
        check_residual(self.base.len(), residual)
    }
}
