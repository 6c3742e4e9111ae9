//! Coefficients and the generalized linear model built from them.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::TaskType;
use crate::data::SparseVector;

/// Coefficient means with optional per-coefficient variances.
///
/// Owned by the model that produced them; coordinates clone rather than share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub means: Array1<f64>,
    pub variances: Option<Array1<f64>>,
}

impl Coefficients {
    pub fn new(means: Array1<f64>) -> Self {
        Self {
            means,
            variances: None,
        }
    }

    pub fn zeros(dimension: usize) -> Self {
        Self::new(Array1::zeros(dimension))
    }

    pub fn with_variances(mut self, variances: Option<Array1<f64>>) -> Self {
        self.variances = variances;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.means.len()
    }

    #[inline]
    pub fn means(&self) -> ArrayView1<'_, f64> {
        self.means.view()
    }

    /// `x . means`.
    #[inline]
    pub fn score(&self, features: &SparseVector) -> f64 {
        features.dot(self.means.view())
    }
}

/// A GLM: coefficients plus the task that defines its loss and link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralizedLinearModel {
    task: TaskType,
    coefficients: Coefficients,
}

impl GeneralizedLinearModel {
    pub fn new(task: TaskType, coefficients: Coefficients) -> Self {
        Self { task, coefficients }
    }

    pub fn zeros(task: TaskType, dimension: usize) -> Self {
        Self::new(task, Coefficients::zeros(dimension))
    }

    #[inline]
    pub fn task(&self) -> TaskType {
        self.task
    }

    #[inline]
    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.coefficients.dimension()
    }

    /// Margin without offset.
    #[inline]
    pub fn score(&self, features: &SparseVector) -> f64 {
        self.coefficients.score(features)
    }

    /// Expected response for `features` with a prior `offset`.
    pub fn predict_mean(&self, features: &SparseVector, offset: f64) -> f64 {
        self.task.mean(self.score(features) + offset)
    }
}
