//! Task types: which loss, link, and default evaluator a model uses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::evaluation::EvaluatorType;
use crate::function::{sigmoid, Loss};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    LogisticRegression,
    LinearRegression,
    PoissonRegression,
    SmoothedHingeLossLinearSvm,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::LogisticRegression,
        TaskType::LinearRegression,
        TaskType::PoissonRegression,
        TaskType::SmoothedHingeLossLinearSvm,
    ];

    pub fn loss(self) -> Loss {
        match self {
            TaskType::LogisticRegression => Loss::Logistic,
            TaskType::LinearRegression => Loss::Squared,
            TaskType::PoissonRegression => Loss::Poisson,
            TaskType::SmoothedHingeLossLinearSvm => Loss::SmoothedHinge,
        }
    }

    /// Evaluator used when a configuration names none.
    pub fn default_evaluator(self) -> EvaluatorType {
        match self {
            TaskType::LogisticRegression | TaskType::SmoothedHingeLossLinearSvm => EvaluatorType::Auc,
            TaskType::LinearRegression => EvaluatorType::Rmse,
            TaskType::PoissonRegression => EvaluatorType::PoissonLoss,
        }
    }

    pub fn is_binary_classification(self) -> bool {
        matches!(
            self,
            TaskType::LogisticRegression | TaskType::SmoothedHingeLossLinearSvm
        )
    }

    /// Inverse link: expected response for a margin.
    pub fn mean(self, margin: f64) -> f64 {
        match self {
            TaskType::LogisticRegression => sigmoid(margin),
            TaskType::PoissonRegression => margin.exp(),
            TaskType::LinearRegression | TaskType::SmoothedHingeLossLinearSvm => margin,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TaskType::LogisticRegression => "LOGISTIC_REGRESSION",
            TaskType::LinearRegression => "LINEAR_REGRESSION",
            TaskType::PoissonRegression => "POISSON_REGRESSION",
            TaskType::SmoothedHingeLossLinearSvm => "SMOOTHED_HINGE_LOSS_LINEAR_SVM",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ConfigError::Conflict(format!("unknown task type '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        for task in TaskType::ALL {
            assert_eq!(task.to_string().parse::<TaskType>().unwrap(), task);
        }
        assert_eq!("logistic_regression".parse::<TaskType>().unwrap(), TaskType::LogisticRegression);
        assert!("RANKING".parse::<TaskType>().is_err());
    }

    #[test]
    fn default_evaluators() {
        assert_eq!(TaskType::LogisticRegression.default_evaluator(), EvaluatorType::Auc);
        assert_eq!(TaskType::LinearRegression.default_evaluator(), EvaluatorType::Rmse);
        assert_eq!(TaskType::PoissonRegression.default_evaluator(), EvaluatorType::PoissonLoss);
        assert_eq!(TaskType::SmoothedHingeLossLinearSvm.default_evaluator(), EvaluatorType::Auc);
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&TaskType::SmoothedHingeLossLinearSvm).unwrap();
        assert_eq!(json, "\"SMOOTHED_HINGE_LOSS_LINEAR_SVM\"");
    }
}
