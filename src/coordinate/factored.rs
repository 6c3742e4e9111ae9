//! Factored random-effect coordinate.
//!
//! Every entity `e` scores `z_e . (P x)` with a shared `k x d` latent matrix
//! `P`. An update alternates, `inner_iterations` times:
//!
//! 1. the entity step: one single-node GLM per entity over the features `P x`;
//! 2. the latent step: one distributed GLM over `vec(P)` (row-major) whose
//!    feature at `r * d + j` is `z_e[r] * x_j`.
//!
//! Both steps train against the same residual offsets.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

use super::{CoordinateSettings, FactoredRandomEffectConfig};
use crate::data::{
    DatasetCache, EntityRows, LabeledPoint, NormalizationContext, RandomEffectDataset, Scores, SparseVector,
    TrainingData,
};
use crate::error::{GameError, Result};
use crate::model::{latent_features, Coefficients, FactoredRandomEffectModel, GeneralizedLinearModel, TaskType};
use crate::optimization::{DistributedOptimizationProblem, SingleNodeOptimizationProblem, VarianceComputationType};
use crate::projection::ProjectionMatrix;
use crate::utils::Parallelism;

#[derive(Debug)]
pub struct FactoredRandomEffectCoordinate {
    id: String,
    dataset: RandomEffectDataset,
    /// One problem per entity, in the dataset's entity order.
    entity_problems: Vec<SingleNodeOptimizationProblem>,
    latent_problem: DistributedOptimizationProblem,
    cache: DatasetCache<Vec<TrainingData>>,
    latent_dim: usize,
    inner_iterations: usize,
    seed: u64,
    task: TaskType,
    parallelism: Parallelism,
}

impl FactoredRandomEffectCoordinate {
    pub fn new(
        id: String,
        dataset: RandomEffectDataset,
        config: &FactoredRandomEffectConfig,
        settings: &CoordinateSettings,
    ) -> Result<Self> {
        if dataset.entities().is_empty() {
            return Err(GameError::EmptyDataset(format!("coordinate '{id}' has no entities")));
        }
        let entity_problems = dataset
            .entities()
            .values()
            .map(|_| {
                SingleNodeOptimizationProblem::single_node(
                    &config.random_effect.optimization,
                    settings.task,
                    settings.variance,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let latent_problem = DistributedOptimizationProblem::distributed(
            &config.latent_factor,
            settings.task,
            VarianceComputationType::None,
            Arc::new(NormalizationContext::identity()),
            settings.n_partitions,
            settings.tree_aggregate_depth,
            settings.parallelism,
        )?;

        Ok(Self {
            cache: DatasetCache::new(format!("{id}/latent-entities")),
            seed: settings.coordinate_seed(&id),
            id,
            dataset,
            entity_problems,
            latent_problem,
            latent_dim: config.latent_dim,
            inner_iterations: config.inner_iterations,
            task: settings.task,
            parallelism: settings.parallelism,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dataset(&self) -> &RandomEffectDataset {
        &self.dataset
    }

    /// Seeded Gaussian latent matrix; no entity models.
    pub fn initial_model(&self) -> FactoredRandomEffectModel {
        let dimension = self.dataset.shard().dimension;
        let latent = ProjectionMatrix::gaussian(self.latent_dim, dimension, None, self.seed)
            .matrix()
            .clone();
        FactoredRandomEffectModel::new(
            self.dataset.random_effect_type(),
            self.dataset.shard_id(),
            latent,
            BTreeMap::new(),
        )
    }

    pub fn update_model(
        &mut self,
        model: &FactoredRandomEffectModel,
        residual: &Scores,
        round: usize,
    ) -> Result<(FactoredRandomEffectModel, Scores)> {
        if residual.len() != self.dataset.len() {
            return Err(GameError::DimensionMismatch {
                expected: self.dataset.len(),
                got: residual.len(),
            });
        }
        let dimension = self.dataset.shard().dimension;
        if model.latent().dim() != (self.latent_dim, dimension) {
            return Err(GameError::DimensionMismatch {
                expected: self.latent_dim * dimension,
                got: model.latent().len(),
            });
        }

        let mut latent = model.latent().clone();
        let mut models = model.models().clone();
        for inner in 0..self.inner_iterations {
            models = self.entity_step(&latent, &models, residual, round)?;
            latent = self.latent_step(&latent, &models, residual, round)?;
            log::trace!("coordinate '{}' round {round}: inner iteration {inner} done", self.id);
        }

        let model = FactoredRandomEffectModel::new(
            self.dataset.random_effect_type(),
            self.dataset.shard_id(),
            latent,
            models,
        );
        let scores = self.score(&model);
        Ok((model, scores))
    }

    /// Optimize every `z_e` with `P` held fixed.
    fn entity_step(
        &mut self,
        latent: &Array2<f64>,
        previous: &BTreeMap<String, GeneralizedLinearModel>,
        residual: &Scores,
        round: usize,
    ) -> Result<BTreeMap<String, GeneralizedLinearModel>> {
        let points = self.dataset.points();
        let entities: Vec<(&String, &EntityRows)> = self.dataset.entities().iter().collect();
        let parallelism = self.parallelism;
        let k = self.latent_dim;

        let data = self.cache.refresh(|| {
            Ok(parallelism.maybe_par_map(entities.as_slice(), |(_, rows)| {
                let projected = rows
                    .active
                    .iter()
                    .map(|&r| {
                        let p = &points[r];
                        let z = SparseVector::from_dense(latent_features(latent, p.features()).view());
                        p.with_features(Arc::new(z)).shifted(residual.get(r))
                    })
                    .collect();
                TrainingData::new_unchecked(projected, k)
            }))
        })?;

        let fit = |((problem, (entity_id, _)), data): (
            (&mut SingleNodeOptimizationProblem, &(&String, &EntityRows)),
            &TrainingData,
        )|
         -> Result<(String, GeneralizedLinearModel)> {
            let glm = match previous.get(entity_id.as_str()) {
                Some(warm) => problem.update_coefficient_means(data, warm, round)?,
                None => problem.run(data, round)?,
            };
            Ok(((*entity_id).clone(), glm))
        };

        if parallelism.is_parallel() {
            self.entity_problems
                .par_iter_mut()
                .zip(entities.par_iter())
                .zip(data.par_iter())
                .map(fit)
                .collect()
        } else {
            self.entity_problems
                .iter_mut()
                .zip(entities.iter())
                .zip(data.iter())
                .map(fit)
                .collect()
        }
    }

    /// Optimize `P` with every `z_e` held fixed.
    fn latent_step(
        &mut self,
        latent: &Array2<f64>,
        models: &BTreeMap<String, GeneralizedLinearModel>,
        residual: &Scores,
        round: usize,
    ) -> Result<Array2<f64>> {
        let (k, dimension) = latent.dim();
        let points = self.dataset.points();

        let latent_points: Vec<LabeledPoint> = self
            .dataset
            .entities()
            .iter()
            .filter_map(|(entity, rows)| models.get(entity).map(|m| (rows, m.coefficients().means())))
            .flat_map(|(rows, z)| {
                rows.active.iter().map(move |&r| {
                    let p = &points[r];
                    let features = outer_features(z, p.features(), dimension);
                    p.with_features(Arc::new(features)).shifted(residual.get(r))
                })
            })
            .collect();
        if latent_points.is_empty() {
            return Ok(latent.clone());
        }

        let data = TrainingData::new_unchecked(latent_points, k * dimension);
        let warm = GeneralizedLinearModel::new(self.task, Coefficients::new(latent.iter().copied().collect()));
        let fitted = self.latent_problem.update_coefficient_means(&data, &warm, round)?;

        Array2::from_shape_vec((k, dimension), fitted.coefficients().means.to_vec())
            .map_err(|e| GameError::Data(format!("latent matrix reshape failed: {e}")))
    }

    /// Scores every row of every entity that has a model.
    pub fn score(&self, model: &FactoredRandomEffectModel) -> Scores {
        let points = self.dataset.points();
        let entities: Vec<_> = self.dataset.entities().iter().collect();
        let per_entity: Vec<Vec<(usize, f64)>> = self.parallelism.maybe_par_map(entities, |(entity, rows)| {
            match model.models().get(entity) {
                Some(glm) => {
                    let z = glm.coefficients().means();
                    rows.rows
                        .iter()
                        .map(|&r| (r, model.project(points[r].features()).dot(&z)))
                        .collect()
                }
                None => Vec::new(),
            }
        });

        let mut scores = vec![0.0; self.dataset.len()];
        for (row, score) in per_entity.into_iter().flatten() {
            scores[row] = score;
        }
        Scores::from_vec(scores)
    }

    /// Entity terms on `z_e` plus the latent term on `vec(P)`.
    pub fn regularization_term_value(&self, model: &FactoredRandomEffectModel) -> f64 {
        let entities: f64 = self
            .entity_problems
            .iter()
            .zip(self.dataset.entities().keys())
            .filter_map(|(problem, entity)| model.models().get(entity).map(|m| problem.regularization_term_value(m)))
            .sum();
        let latent = GeneralizedLinearModel::new(
            self.task,
            Coefficients::new(model.latent().iter().copied().collect::<Array1<f64>>()),
        );
        entities + self.latent_problem.regularization_term_value(&latent)
    }
}

/// `z ⊗ x` laid out as `r * dimension + j`; indices of `x` at or beyond `dimension` are dropped.
fn outer_features(z: ArrayView1<f64>, x: &SparseVector, dimension: usize) -> SparseVector {
    let nnz = x.iter().filter(|&(j, _)| j < dimension).count();
    let mut indices = Vec::with_capacity(z.len() * nnz);
    let mut values = Vec::with_capacity(z.len() * nnz);
    for (r, &zr) in z.iter().enumerate() {
        for (j, v) in x.iter().filter(|&(j, _)| j < dimension) {
            indices.push(r * dimension + j);
            values.push(zr * v);
        }
    }
    SparseVector::from_sorted_unchecked(indices, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::RandomEffectConfig;
    use crate::function::RegularizationContext;
    use crate::optimization::{GlmOptimizationConfig, OptimizerConfig};
    use crate::testing::{mixed_effect_dataset, ENTITY_ID_TYPE, ENTITY_SHARD};
    use approx::assert_abs_diff_eq;

    fn optimization() -> GlmOptimizationConfig {
        GlmOptimizationConfig::builder()
            .optimizer(OptimizerConfig::builder().max_iterations(50).build().unwrap())
            .regularization(RegularizationContext::l2())
            .regularization_weight(0.1)
            .build()
            .unwrap()
    }

    fn coordinate(inner_iterations: usize) -> (FactoredRandomEffectCoordinate, usize) {
        let data = mixed_effect_dataset(TaskType::LinearRegression, 4, 15, 2, 21).unwrap();
        let base = RandomEffectDataset::new(&data, ENTITY_ID_TYPE, ENTITY_SHARD, None, 0).unwrap();
        let config = FactoredRandomEffectConfig::builder()
            .random_effect(
                RandomEffectConfig::builder()
                    .random_effect_type(ENTITY_ID_TYPE)
                    .feature_shard_id(ENTITY_SHARD)
                    .optimization(optimization())
                    .build()
                    .unwrap(),
            )
            .latent_factor(optimization())
            .latent_dim(2)
            .inner_iterations(inner_iterations)
            .build()
            .unwrap();
        let settings = CoordinateSettings::new(TaskType::LinearRegression);
        let n = data.len();
        (FactoredRandomEffectCoordinate::new("factored".into(), base, &config, &settings).unwrap(), n)
    }

    #[test]
    fn outer_features_are_row_major() {
        let x = SparseVector::new([(0, 2.0), (2, 1.0)]).unwrap();
        let f = outer_features(ndarray::array![1.0, -3.0].view(), &x, 3);
        assert_eq!(f.indices(), &[0, 2, 3, 5]);
        assert_eq!(f.values(), &[2.0, 1.0, -6.0, -3.0]);
    }

    #[test]
    fn update_keeps_shapes_and_scores_match_model() {
        let (mut coordinate, n) = coordinate(2);
        let initial = coordinate.initial_model();
        assert_eq!(initial.latent().dim(), (2, 2));

        let (model, scores) = coordinate.update_model(&initial, &Scores::zeros(n), 0).unwrap();
        assert_eq!(model.latent().dim(), (2, 2));
        assert_eq!(model.models().len(), 4);
        assert!(model.models().values().all(|m| m.dimension() == 2));
        assert_eq!(scores, coordinate.score(&model));
        assert!(coordinate.regularization_term_value(&model) > 0.0);
    }

    #[test]
    fn scores_match_game_model_scoring() {
        let (mut coordinate, n) = coordinate(1);
        let data = mixed_effect_dataset(TaskType::LinearRegression, 4, 15, 2, 21).unwrap();
        let (model, scores) = coordinate
            .update_model(&coordinate.initial_model(), &Scores::zeros(n), 0)
            .unwrap();
        for (uid, datum) in data.data().iter().enumerate() {
            assert_abs_diff_eq!(model.score_datum(datum, uid).unwrap(), scores.get(uid), epsilon = 1e-12);
        }
    }

    #[test]
    fn wrong_latent_shape_rejected() {
        let (mut coordinate, n) = coordinate(1);
        let bad = FactoredRandomEffectModel::new(ENTITY_ID_TYPE, ENTITY_SHARD, Array2::zeros((3, 2)), BTreeMap::new());
        assert!(matches!(
            coordinate.update_model(&bad, &Scores::zeros(n), 0),
            Err(GameError::DimensionMismatch { .. })
        ));
    }
}
