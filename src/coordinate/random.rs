//! Random-effect coordinate: one independent GLM per entity.

use std::collections::BTreeMap;

use rayon::prelude::*;

use super::{CoordinateSettings, RandomEffectConfig};
use crate::data::{DatasetCache, ProjectedEntity, RandomEffectDatasetInProjectedSpace, Scores, TrainingData};
use crate::error::{ConfigError, GameError, Result};
use crate::model::{Coefficients, GeneralizedLinearModel, RandomEffectModel, TaskType};
use crate::optimization::{BoxConstraints, GlmOptimizationConfig, SingleNodeOptimizationProblem};
use crate::projection::Projector;
use crate::utils::Parallelism;

#[derive(Debug)]
pub struct RandomEffectCoordinate {
    id: String,
    dataset: RandomEffectDatasetInProjectedSpace,
    /// One problem per entity, in the dataset's entity order.
    problems: Vec<SingleNodeOptimizationProblem>,
    cache: DatasetCache<Vec<TrainingData>>,
    /// Bounds over the shard's original feature indices.
    constraints: Option<BoxConstraints>,
    task: TaskType,
    parallelism: Parallelism,
}

impl RandomEffectCoordinate {
    pub fn new(
        id: String,
        dataset: RandomEffectDatasetInProjectedSpace,
        config: &RandomEffectConfig,
        settings: &CoordinateSettings,
    ) -> Result<Self> {
        if dataset.entities().is_empty() {
            return Err(GameError::EmptyDataset(format!("coordinate '{id}' has no entities")));
        }
        let problems = dataset
            .entities()
            .values()
            .map(|entity| {
                let optimization = entity_optimization(&config.optimization, &entity.projector)?;
                SingleNodeOptimizationProblem::single_node(&optimization, settings.task, settings.variance)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!(
            "coordinate '{id}': {} entities of '{}'",
            problems.len(),
            config.random_effect_type
        );

        Ok(Self {
            cache: DatasetCache::new(format!("{id}/entities")),
            id,
            dataset,
            problems,
            constraints: config.optimization.optimizer.box_constraints.clone().filter(|b| !b.is_empty()),
            task: settings.task,
            parallelism: settings.parallelism,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dataset(&self) -> &RandomEffectDatasetInProjectedSpace {
        &self.dataset
    }

    /// No entity has a model yet; every example scores 0.
    pub fn initial_model(&self) -> RandomEffectModel {
        let base = self.dataset.base();
        RandomEffectModel::new(base.random_effect_type(), base.shard_id(), BTreeMap::new())
    }

    /// Re-optimize every entity independently against `residual`.
    pub fn update_model(
        &mut self,
        model: &RandomEffectModel,
        residual: &Scores,
        round: usize,
    ) -> Result<(RandomEffectModel, Scores)> {
        self.dataset.check_residual(residual)?;
        let entities: Vec<(&String, &ProjectedEntity)> = self.dataset.entities().iter().collect();
        let parallelism = self.parallelism;

        let data = self.cache.refresh(|| {
            Ok(parallelism.maybe_par_map(entities.as_slice(), |(_, entity)| entity.with_residual(residual)))
        })?;

        let task = self.task;
        let constraints = self.constraints.as_ref();
        let fit = |((problem, (entity_id, entity)), data): (
            (&mut SingleNodeOptimizationProblem, &(&String, &ProjectedEntity)),
            &TrainingData,
        )|
         -> Result<(String, GeneralizedLinearModel)> {
            let glm = fit_entity(problem, entity, data, model.get(entity_id.as_str()), constraints, task, round)?;
            Ok(((*entity_id).clone(), glm))
        };

        let models: BTreeMap<String, GeneralizedLinearModel> = if parallelism.is_parallel() {
            self.problems
                .par_iter_mut()
                .zip(entities.par_iter())
                .zip(data.par_iter())
                .map(fit)
                .collect::<Result<_>>()?
        } else {
            self.problems
                .iter_mut()
                .zip(entities.iter())
                .zip(data.iter())
                .map(fit)
                .collect::<Result<_>>()?
        };

        let not_converged = self
            .problems
            .iter()
            .filter(|p| p.states_tracker().is_some_and(|t| !t.converged()))
            .count();
        if not_converged > 0 {
            log::debug!(
                "coordinate '{}' round {round}: {not_converged}/{} entities hit the iteration cap",
                self.id,
                self.problems.len()
            );
        }

        let base = self.dataset.base();
        let model = RandomEffectModel::new(base.random_effect_type(), base.shard_id(), models);
        let scores = self.score(&model);
        Ok((model, scores))
    }

    /// Scores every row of every entity, including rows outside the active set.
    pub fn score(&self, model: &RandomEffectModel) -> Scores {
        let base = self.dataset.base();
        let points = base.points();
        let entities: Vec<_> = base.entities().iter().collect();
        let per_entity: Vec<Vec<(usize, f64)>> = self.parallelism.maybe_par_map(entities, |(entity, rows)| {
            match model.get(entity) {
                Some(glm) => rows
                    .rows
                    .iter()
                    .map(|&r| (r, glm.score(points[r].features())))
                    .collect(),
                None => Vec::new(),
            }
        });

        let mut scores = vec![0.0; base.len()];
        for (row, score) in per_entity.into_iter().flatten() {
            scores[row] = score;
        }
        Scores::from_vec(scores)
    }

    /// Sum of the per-entity regularization terms, measured in each entity's projected space.
    pub fn regularization_term_value(&self, model: &RandomEffectModel) -> f64 {
        self.problems
            .iter()
            .zip(self.dataset.entities())
            .filter_map(|(problem, (entity_id, entity))| {
                model.get(entity_id).map(|glm| {
                    let projected = GeneralizedLinearModel::new(
                        glm.task(),
                        Coefficients::new(entity.projector.project_coefficients(glm.coefficients().means())),
                    );
                    problem.regularization_term_value(&projected)
                })
            })
            .sum()
    }
}

/// The entity's optimization with bounds renumbered into its projected space.
fn entity_optimization(config: &GlmOptimizationConfig, projector: &Projector) -> Result<GlmOptimizationConfig> {
    let Some(bounds) = config.optimizer.box_constraints.as_ref().filter(|b| !b.is_empty()) else {
        return Ok(config.clone());
    };
    let projected = match projector {
        Projector::Identity { .. } => bounds.clone(),
        Projector::IndexMap(p) => bounds.remap(|i| p.projected_index(i)),
        Projector::Random(_) => {
            return Err(ConfigError::Conflict("box constraints need an identity or index-map projector".into()).into())
        }
    };
    let mut config = config.clone();
    config.optimizer.box_constraints = Some(projected);
    Ok(config)
}

/// Optimize one entity in its projected space and return the model in the original space.
///
/// Features the entity never uses come back as zero; their bounds are
/// applied afterwards, which leaves the entity's scores unchanged.
///
/// Index-map and identity projections invert exactly, so the previous model
/// warm starts the optimizer. A random projection does not; its optimizer
/// resumes from its own previous solution instead.
fn fit_entity(
    problem: &mut SingleNodeOptimizationProblem,
    entity: &ProjectedEntity,
    data: &TrainingData,
    previous: Option<&GeneralizedLinearModel>,
    constraints: Option<&BoxConstraints>,
    task: TaskType,
    round: usize,
) -> Result<GeneralizedLinearModel> {
    let projector = &entity.projector;
    let projected = match (previous, projector) {
        (Some(glm), Projector::Identity { .. } | Projector::IndexMap(_)) => {
            let warm = GeneralizedLinearModel::new(
                task,
                Coefficients::new(projector.project_coefficients(glm.coefficients().means())),
            );
            problem.update_coefficient_means(data, &warm, round)?
        }
        _ => problem.run(data, round)?,
    };

    let coefficients = projected.coefficients();
    let mut means = projector.project_back(coefficients.means());
    if let Some(bounds) = constraints {
        bounds.project(&mut means);
    }
    let variances = coefficients
        .variances
        .as_ref()
        .map(|v| projector.project_variances_back(v.view()));
    Ok(GeneralizedLinearModel::new(
        task,
        Coefficients::new(means).with_variances(variances),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RandomEffectDataset;
    use crate::optimization::{GlmOptimizationConfig, OptimizerConfig, VarianceComputationType};
    use crate::projection::ProjectorType;
    use crate::testing::{mixed_effect_dataset, ENTITY_ID_TYPE, ENTITY_SHARD};
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    fn config(projector: ProjectorType) -> RandomEffectConfig {
        RandomEffectConfig::builder()
            .random_effect_type(ENTITY_ID_TYPE)
            .feature_shard_id(ENTITY_SHARD)
            .optimization(
                GlmOptimizationConfig::builder()
                    .optimizer(OptimizerConfig::builder().tolerance(1e-10).max_iterations(200).build().unwrap())
                    .build()
                    .unwrap(),
            )
            .projector(projector)
            .build()
            .unwrap()
    }

    fn coordinate(projector: ProjectorType, parallelism: Parallelism) -> (RandomEffectCoordinate, usize) {
        let data = mixed_effect_dataset(TaskType::LinearRegression, 5, 20, 2, 8).unwrap();
        let base = RandomEffectDataset::new(&data, ENTITY_ID_TYPE, ENTITY_SHARD, None, 0).unwrap();
        let projected = RandomEffectDatasetInProjectedSpace::build(base, projector, 0);
        let settings = CoordinateSettings {
            variance: VarianceComputationType::Simple,
            parallelism,
            ..CoordinateSettings::new(TaskType::LinearRegression)
        };
        let n = data.len();
        (
            RandomEffectCoordinate::new("per-user".into(), projected, &config(projector), &settings).unwrap(),
            n,
        )
    }

    #[rstest]
    #[case::index_map(ProjectorType::IndexMap)]
    #[case::identity(ProjectorType::Identity)]
    fn every_entity_gets_a_model(#[case] projector: ProjectorType) {
        let (mut coordinate, n) = coordinate(projector, Parallelism::Parallel);
        let (model, scores) = coordinate
            .update_model(&coordinate.initial_model(), &Scores::zeros(n), 0)
            .unwrap();
        assert_eq!(model.n_entities(), 5);
        assert_eq!(scores.len(), n);
        assert!(model.models().values().all(|m| m.dimension() == 2));
        assert!(model.models().values().all(|m| m.coefficients().variances.is_some()));
        assert!(coordinate.regularization_term_value(&model) == 0.0);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let (mut a, n) = coordinate(ProjectorType::IndexMap, Parallelism::Parallel);
        let (mut b, _) = coordinate(ProjectorType::IndexMap, Parallelism::Sequential);
        let (_, sa) = a.update_model(&a.initial_model(), &Scores::zeros(n), 0).unwrap();
        let (_, sb) = b.update_model(&b.initial_model(), &Scores::zeros(n), 0).unwrap();
        for i in 0..n {
            assert_abs_diff_eq!(sa.get(i), sb.get(i), epsilon = 1e-12);
        }
    }

    #[test]
    fn random_projection_scores_in_original_space() {
        let (mut coordinate, n) = coordinate(ProjectorType::Random { dimension: 1 }, Parallelism::Parallel);
        let (model, scores) = coordinate
            .update_model(&coordinate.initial_model(), &Scores::zeros(n), 0)
            .unwrap();
        // one random row plus the intercept row, projected back to 2 raw features
        assert!(model.models().values().all(|m| m.dimension() == 2));
        assert_eq!(scores, coordinate.score(&model));
    }

    #[test]
    fn previous_generation_released_on_update() {
        let (mut coordinate, n) = coordinate(ProjectorType::IndexMap, Parallelism::Parallel);
        let initial = coordinate.initial_model();
        let (model, _) = coordinate.update_model(&initial, &Scores::zeros(n), 0).unwrap();
        coordinate.update_model(&model, &Scores::zeros(n), 1).unwrap();
        assert_eq!(coordinate.cache.generation(), 2);
        assert!(coordinate.cache.is_resident());
    }

    #[test]
    fn short_residual_rejected() {
        let (mut coordinate, _) = coordinate(ProjectorType::IndexMap, Parallelism::Parallel);
        assert!(matches!(
            coordinate.update_model(&coordinate.initial_model(), &Scores::zeros(3), 0),
            Err(GameError::DimensionMismatch { .. })
        ));
    }
}
