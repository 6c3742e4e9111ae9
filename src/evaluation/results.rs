//! Named metric values and the suite that produces them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::evaluator::{EvaluationData, EvaluatorType};
use crate::data::{GameDataset, Scores};
use crate::error::{ConfigError, Result};

/// One evaluator's value, carrying its comparison direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub evaluator: EvaluatorType,
    pub value: f64,
}

impl MetricValue {
    pub fn name(&self) -> String {
        self.evaluator.to_string()
    }

    pub fn higher_is_better(&self) -> bool {
        self.evaluator.higher_is_better()
    }

    /// Strictly better than `other` in this metric's direction.
    pub fn better_than(&self, other: &MetricValue) -> bool {
        self.evaluator.better_than(self.value, other.value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:.6}", self.evaluator, self.value)
    }
}

/// Values of every evaluator in a suite; the first is the primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResults {
    values: Vec<MetricValue>,
}

impl EvaluationResults {
    pub fn primary(&self) -> &MetricValue {
        &self.values[0]
    }

    pub fn values(&self) -> &[MetricValue] {
        &self.values
    }

    pub fn get(&self, evaluator: &EvaluatorType) -> Option<f64> {
        self.values
            .iter()
            .find(|v| &v.evaluator == evaluator)
            .map(|v| v.value)
    }

    /// Primary metric strictly better than `other`'s.
    pub fn better_than(&self, other: &EvaluationResults) -> bool {
        self.primary().better_than(other.primary())
    }
}

impl fmt::Display for EvaluationResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

/// Evaluators bound to one dataset's labels, offsets, weights and ids.
#[derive(Debug, Clone)]
pub struct EvaluationSuite {
    evaluators: Vec<EvaluatorType>,
    data: EvaluationData,
}

impl EvaluationSuite {
    /// # Errors
    ///
    /// [`ConfigError::Conflict`] for an empty evaluator list; the data errors
    /// of [`EvaluationData::from_dataset`].
    pub fn new(evaluators: Vec<EvaluatorType>, dataset: &GameDataset) -> Result<Self> {
        if evaluators.is_empty() {
            return Err(ConfigError::Conflict("an evaluation suite needs at least one evaluator".into()).into());
        }
        let data = EvaluationData::from_dataset(dataset, &evaluators)?;
        Ok(Self { evaluators, data })
    }

    pub fn with_default_score(mut self, default_score: f64) -> Self {
        self.data = self.data.with_default_score(default_score);
        self
    }

    pub fn primary(&self) -> &EvaluatorType {
        &self.evaluators[0]
    }

    pub fn evaluators(&self) -> &[EvaluatorType] {
        &self.evaluators
    }

    pub fn data(&self) -> &EvaluationData {
        &self.data
    }

    pub fn evaluate(&self, scores: &Scores) -> Result<EvaluationResults> {
        let values = self
            .evaluators
            .iter()
            .map(|e| {
                Ok(MetricValue {
                    evaluator: e.clone(),
                    value: e.evaluate(scores, &self.data)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(EvaluationResults { values })
    }
}
