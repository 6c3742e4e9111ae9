//! Per-coordinate models and the GAME model that sums them.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{GeneralizedLinearModel, TaskType};
use crate::data::{GameDataset, GameDatum, Scores, SparseVector};
use crate::error::Result;

// =============================================================================
// Fixed Effect
// =============================================================================

/// One global GLM over a feature shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedEffectModel {
    shard_id: String,
    model: GeneralizedLinearModel,
}

impl FixedEffectModel {
    pub fn new(shard_id: impl Into<String>, model: GeneralizedLinearModel) -> Self {
        Self {
            shard_id: shard_id.into(),
            model,
        }
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn model(&self) -> &GeneralizedLinearModel {
        &self.model
    }

    pub fn score_datum(&self, datum: &GameDatum, uid: usize) -> Result<f64> {
        Ok(self.model.score(datum.shard(&self.shard_id, uid)?))
    }
}

// =============================================================================
// Random Effect
// =============================================================================

/// One GLM per entity. Entities without a model score 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomEffectModel {
    random_effect_type: String,
    shard_id: String,
    models: BTreeMap<String, GeneralizedLinearModel>,
}

impl RandomEffectModel {
    pub fn new(
        random_effect_type: impl Into<String>,
        shard_id: impl Into<String>,
        models: BTreeMap<String, GeneralizedLinearModel>,
    ) -> Self {
        Self {
            random_effect_type: random_effect_type.into(),
            shard_id: shard_id.into(),
            models,
        }
    }

    pub fn random_effect_type(&self) -> &str {
        &self.random_effect_type
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn models(&self) -> &BTreeMap<String, GeneralizedLinearModel> {
        &self.models
    }

    pub fn get(&self, entity: &str) -> Option<&GeneralizedLinearModel> {
        self.models.get(entity)
    }

    pub fn n_entities(&self) -> usize {
        self.models.len()
    }

    pub fn score_datum(&self, datum: &GameDatum, uid: usize) -> Result<f64> {
        let entity = datum.id(&self.random_effect_type, uid)?;
        match self.models.get(entity) {
            Some(model) => Ok(model.score(datum.shard(&self.shard_id, uid)?)),
            None => Ok(0.0),
        }
    }
}

// =============================================================================
// Factored Random Effect
// =============================================================================

/// Per-entity models in a shared latent space: `score = z_e . (P x)`.
///
/// `latent` is the `k x d` projection `P`; each entity model has dimension `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactoredRandomEffectModel {
    random_effect_type: String,
    shard_id: String,
    latent: Array2<f64>,
    models: BTreeMap<String, GeneralizedLinearModel>,
}

impl FactoredRandomEffectModel {
    pub fn new(
        random_effect_type: impl Into<String>,
        shard_id: impl Into<String>,
        latent: Array2<f64>,
        models: BTreeMap<String, GeneralizedLinearModel>,
    ) -> Self {
        Self {
            random_effect_type: random_effect_type.into(),
            shard_id: shard_id.into(),
            latent,
            models,
        }
    }

    pub fn random_effect_type(&self) -> &str {
        &self.random_effect_type
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn latent(&self) -> &Array2<f64> {
        &self.latent
    }

    pub fn latent_dimension(&self) -> usize {
        self.latent.nrows()
    }

    pub fn models(&self) -> &BTreeMap<String, GeneralizedLinearModel> {
        &self.models
    }

    /// `P x`.
    pub fn project(&self, features: &SparseVector) -> Array1<f64> {
        latent_features(&self.latent, features)
    }

    /// Entity coefficients over the raw features: `P^T z_e`.
    pub fn entity_coefficients(&self, entity: &str) -> Option<Array1<f64>> {
        self.models
            .get(entity)
            .map(|m| self.latent.t().dot(&m.coefficients().means))
    }

    pub fn score_datum(&self, datum: &GameDatum, uid: usize) -> Result<f64> {
        let entity = datum.id(&self.random_effect_type, uid)?;
        match self.models.get(entity) {
            Some(model) => {
                let z = self.project(datum.shard(&self.shard_id, uid)?);
                Ok(z.dot(&model.coefficients().means))
            }
            None => Ok(0.0),
        }
    }
}

/// Dense `P x` for a `k x d` matrix; indices outside `d` are ignored.
pub(crate) fn latent_features(latent: &Array2<f64>, features: &SparseVector) -> Array1<f64> {
    let mut out = Array1::zeros(latent.nrows());
    for (j, v) in features.iter().filter(|&(j, _)| j < latent.ncols()) {
        out.scaled_add(v, &latent.column(j));
    }
    out
}

// =============================================================================
// DatumScoringModel
// =============================================================================

/// The model one coordinate contributes to a [`GameModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatumScoringModel {
    FixedEffect(FixedEffectModel),
    RandomEffect(RandomEffectModel),
    FactoredRandomEffect(FactoredRandomEffectModel),
}

impl DatumScoringModel {
    pub fn score_datum(&self, datum: &GameDatum, uid: usize) -> Result<f64> {
        match self {
            DatumScoringModel::FixedEffect(m) => m.score_datum(datum, uid),
            DatumScoringModel::RandomEffect(m) => m.score_datum(datum, uid),
            DatumScoringModel::FactoredRandomEffect(m) => m.score_datum(datum, uid),
        }
    }

    /// Score every example of `dataset` (offsets excluded).
    pub fn score(&self, dataset: &GameDataset) -> Result<Scores> {
        let scores = dataset
            .data()
            .par_iter()
            .enumerate()
            .map(|(uid, datum)| self.score_datum(datum, uid))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Scores::from_vec(scores))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DatumScoringModel::FixedEffect(_) => "fixed effect",
            DatumScoringModel::RandomEffect(_) => "random effect",
            DatumScoringModel::FactoredRandomEffect(_) => "factored random effect",
        }
    }
}

// =============================================================================
// GameModel
// =============================================================================

/// Coordinate id to coordinate model. The score of an example is the sum of
/// every coordinate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameModel {
    task: TaskType,
    models: BTreeMap<String, DatumScoringModel>,
}

impl GameModel {
    pub fn new(task: TaskType) -> Self {
        Self {
            task,
            models: BTreeMap::new(),
        }
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    pub fn models(&self) -> &BTreeMap<String, DatumScoringModel> {
        &self.models
    }

    pub fn get(&self, coordinate_id: &str) -> Option<&DatumScoringModel> {
        self.models.get(coordinate_id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Replace the model of `coordinate_id`, returning a new GAME model.
    pub fn updated(&self, coordinate_id: &str, model: DatumScoringModel) -> Self {
        let mut next = self.clone();
        next.models.insert(coordinate_id.to_string(), model);
        next
    }

    pub fn insert(&mut self, coordinate_id: impl Into<String>, model: DatumScoringModel) {
        self.models.insert(coordinate_id.into(), model);
    }

    /// Sum of every coordinate's score (offsets excluded).
    pub fn score(&self, dataset: &GameDataset) -> Result<Scores> {
        let mut total = Scores::zeros(dataset.len());
        for model in self.models.values() {
            total += &model.score(dataset)?;
        }
        Ok(total)
    }

    /// Expected responses: `mean(score + offset)`.
    pub fn predict(&self, dataset: &GameDataset) -> Result<Array1<f64>> {
        let scores = self.score(dataset)?;
        Ok((&scores.view() + &dataset.offsets()).mapv(|z| self.task.mean(z)))
    }
}
