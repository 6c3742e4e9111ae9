//! Evaluator types, parsing, and the data they evaluate against.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::metrics::{auc, loss_sum, precision_at_k, rmse};
use crate::data::{GameDataset, Scores};
use crate::error::{ConfigError, GameError, Result};
use crate::function::Loss;
use crate::model::TaskType;

// =============================================================================
// EvaluationData
// =============================================================================

/// Labels, offsets, weights and entity ids of one evaluation dataset.
///
/// Immutable once built; every evaluation call reads the same values.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationData {
    labels: Vec<f64>,
    offsets: Vec<f64>,
    weights: Vec<f64>,
    ids: BTreeMap<String, Vec<String>>,
    default_score: f64,
}

impl EvaluationData {
    /// Collect what `evaluators` need from `dataset`.
    ///
    /// # Errors
    ///
    /// [`GameError::MissingIdType`] when a sharded evaluator's id type is
    /// missing from an example.
    pub fn from_dataset(dataset: &GameDataset, evaluators: &[EvaluatorType]) -> Result<Self> {
        let id_types: BTreeSet<&str> = evaluators.iter().filter_map(|e| e.id_type()).collect();
        let mut ids = BTreeMap::new();
        for id_type in id_types {
            let column = dataset
                .data()
                .iter()
                .enumerate()
                .map(|(uid, datum)| datum.id(id_type, uid).map(str::to_string))
                .collect::<Result<Vec<_>>>()?;
            ids.insert(id_type.to_string(), column);
        }

        Ok(Self {
            labels: dataset.responses().to_vec(),
            offsets: dataset.offsets().to_vec(),
            weights: dataset.weights().to_vec(),
            ids,
            default_score: 0.0,
        })
    }

    /// Score used for examples whose score is missing (`NaN`).
    pub fn with_default_score(mut self, default_score: f64) -> Self {
        self.default_score = default_score;
        self
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    pub fn default_score(&self) -> f64 {
        self.default_score
    }

    /// `score + offset` per example, substituting the default score for `NaN`.
    pub fn margins(&self, scores: &Scores) -> Result<Vec<f64>> {
        if scores.len() != self.len() {
            return Err(GameError::DimensionMismatch {
                expected: self.len(),
                got: scores.len(),
            });
        }
        Ok(scores
            .view()
            .iter()
            .zip(&self.offsets)
            .map(|(&s, &o)| if s.is_nan() { self.default_score + o } else { s + o })
            .collect())
    }

    /// Example positions grouped by entity id.
    fn groups(&self, id_type: &str) -> Result<HashMap<&str, Vec<usize>>> {
        let column = self.ids.get(id_type).ok_or_else(|| GameError::MissingIdType {
            id_type: id_type.to_string(),
            uid: 0,
        })?;
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, id) in column.iter().enumerate() {
            groups.entry(id.as_str()).or_default().push(i);
        }
        Ok(groups)
    }
}

// =============================================================================
// EvaluatorType
// =============================================================================

/// An evaluation metric.
///
/// Parses from and displays as `AUC`, `RMSE`, `LOGISTIC_LOSS`, `POISSON_LOSS`,
/// `SMOOTHED_HINGE_LOSS`, `SQUARED_LOSS`, `AUC:<idType>` and
/// `PRECISION@<k>:<idType>`; serializes as the same string.
///
/// ```
/// use glmix::evaluation::EvaluatorType;
///
/// let e: EvaluatorType = "PRECISION@5:userId".parse().unwrap();
/// assert_eq!(e, EvaluatorType::ShardedPrecisionAtK { k: 5, id_type: "userId".into() });
/// assert_eq!(e.to_string(), "PRECISION@5:userId");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EvaluatorType {
    Auc,
    Rmse,
    LogisticLoss,
    PoissonLoss,
    SmoothedHingeLoss,
    SquaredLoss,
    /// AUC per entity, averaged over entities with both classes.
    ShardedAuc { id_type: String },
    /// Precision of the top `k` per entity, averaged over entities.
    ShardedPrecisionAtK { k: usize, id_type: String },
}

impl EvaluatorType {
    /// Whether larger values are better.
    pub fn higher_is_better(&self) -> bool {
        matches!(
            self,
            EvaluatorType::Auc | EvaluatorType::ShardedAuc { .. } | EvaluatorType::ShardedPrecisionAtK { .. }
        )
    }

    /// `a` is strictly better than `b`. `NaN` is never better.
    pub fn better_than(&self, a: f64, b: f64) -> bool {
        if self.higher_is_better() {
            a > b
        } else {
            a < b
        }
    }

    pub fn id_type(&self) -> Option<&str> {
        match self {
            EvaluatorType::ShardedAuc { id_type } | EvaluatorType::ShardedPrecisionAtK { id_type, .. } => {
                Some(id_type)
            }
            _ => None,
        }
    }

    /// Fail if this metric has no meaning for `task`'s labels.
    pub fn check_task(&self, task: TaskType) -> Result<()> {
        let supported = match self {
            EvaluatorType::LogisticLoss | EvaluatorType::SmoothedHingeLoss => task.is_binary_classification(),
            EvaluatorType::PoissonLoss => task == TaskType::PoissonRegression,
            _ => true,
        };
        if supported {
            Ok(())
        } else {
            Err(GameError::unsupported(task, format!("evaluator {self}")))
        }
    }

    /// Metric value of `scores` on `data`.
    ///
    /// Undefined metrics (single-class AUC, no weight) evaluate to `NaN`; AUC
    /// over a single class is 0.5.
    pub fn evaluate(&self, scores: &Scores, data: &EvaluationData) -> Result<f64> {
        let margins = data.margins(scores)?;
        let (labels, weights) = (&data.labels[..], &data.weights[..]);

        let value = match self {
            EvaluatorType::Auc => auc(&margins, labels, weights).unwrap_or(0.5),
            EvaluatorType::Rmse => rmse(&margins, labels, weights).unwrap_or(f64::NAN),
            EvaluatorType::LogisticLoss => loss_sum(Loss::Logistic, &margins, labels, weights),
            EvaluatorType::PoissonLoss => loss_sum(Loss::Poisson, &margins, labels, weights),
            EvaluatorType::SmoothedHingeLoss => loss_sum(Loss::SmoothedHinge, &margins, labels, weights),
            EvaluatorType::SquaredLoss => loss_sum(Loss::Squared, &margins, labels, weights),
            EvaluatorType::ShardedAuc { id_type } => sharded_mean(data.groups(id_type)?, |rows| {
                let m: Vec<f64> = rows.iter().map(|&i| margins[i]).collect();
                let l: Vec<f64> = rows.iter().map(|&i| labels[i]).collect();
                let w: Vec<f64> = rows.iter().map(|&i| weights[i]).collect();
                auc(&m, &l, &w)
            }),
            EvaluatorType::ShardedPrecisionAtK { k, id_type } => sharded_mean(data.groups(id_type)?, |rows| {
                let m: Vec<f64> = rows.iter().map(|&i| margins[i]).collect();
                let l: Vec<f64> = rows.iter().map(|&i| labels[i]).collect();
                precision_at_k(*k, &m, &l)
            }),
        };
        Ok(value)
    }
}

/// Unweighted mean of the defined per-entity values, in entity-id order.
fn sharded_mean(groups: HashMap<&str, Vec<usize>>, metric: impl Fn(&[usize]) -> Option<f64>) -> f64 {
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_unstable_by(|a, b| a.0.cmp(b.0));
    let (sum, count) = groups
        .iter()
        .filter_map(|(_, rows)| metric(rows))
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

impl fmt::Display for EvaluatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatorType::Auc => f.write_str("AUC"),
            EvaluatorType::Rmse => f.write_str("RMSE"),
            EvaluatorType::LogisticLoss => f.write_str("LOGISTIC_LOSS"),
            EvaluatorType::PoissonLoss => f.write_str("POISSON_LOSS"),
            EvaluatorType::SmoothedHingeLoss => f.write_str("SMOOTHED_HINGE_LOSS"),
            EvaluatorType::SquaredLoss => f.write_str("SQUARED_LOSS"),
            EvaluatorType::ShardedAuc { id_type } => write!(f, "AUC:{id_type}"),
            EvaluatorType::ShardedPrecisionAtK { k, id_type } => write!(f, "PRECISION@{k}:{id_type}"),
        }
    }
}

impl FromStr for EvaluatorType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let unknown = || ConfigError::UnknownEvaluator(s.to_string());
        let trimmed = s.trim();
        let (head, id_type) = match trimmed.split_once(':') {
            Some((head, id)) if !id.trim().is_empty() => (head.trim().to_ascii_uppercase(), Some(id.trim())),
            Some(_) => return Err(unknown()),
            None => (trimmed.to_ascii_uppercase(), None),
        };

        match (head.as_str(), id_type) {
            ("AUC", None) => Ok(EvaluatorType::Auc),
            ("RMSE", None) => Ok(EvaluatorType::Rmse),
            ("LOGISTIC_LOSS", None) => Ok(EvaluatorType::LogisticLoss),
            ("POISSON_LOSS", None) => Ok(EvaluatorType::PoissonLoss),
            ("SMOOTHED_HINGE_LOSS", None) => Ok(EvaluatorType::SmoothedHingeLoss),
            ("SQUARED_LOSS", None) => Ok(EvaluatorType::SquaredLoss),
            ("AUC", Some(id)) => Ok(EvaluatorType::ShardedAuc { id_type: id.to_string() }),
            (precision, Some(id)) => {
                let k = precision
                    .strip_prefix("PRECISION@")
                    .and_then(|k| k.parse::<usize>().ok())
                    .filter(|&k| k > 0)
                    .ok_or_else(unknown)?;
                Ok(EvaluatorType::ShardedPrecisionAtK {
                    k,
                    id_type: id.to_string(),
                })
            }
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for EvaluatorType {
    type Error = ConfigError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EvaluatorType> for String {
    fn from(value: EvaluatorType) -> Self {
        value.to_string()
    }
}
