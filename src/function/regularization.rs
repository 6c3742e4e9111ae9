//! Regularization settings and how a single weight is split between L1 and L2.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegularizationType {
    #[default]
    None,
    L1,
    L2,
    ElasticNet,
}

/// Regularization type plus the elastic-net mixing parameter.
///
/// For a weight `lambda`, the L1 part is `alpha * lambda` and the L2 part
/// `(1 - alpha) * lambda`; `L1` and `L2` are the `alpha = 1` and `alpha = 0` cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegularizationContext {
    kind: RegularizationType,
    elastic_net_alpha: Option<f64>,
}

impl RegularizationContext {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn l1() -> Self {
        Self {
            kind: RegularizationType::L1,
            elastic_net_alpha: None,
        }
    }

    pub fn l2() -> Self {
        Self {
            kind: RegularizationType::L2,
            elastic_net_alpha: None,
        }
    }

    /// `alpha` must lie in `[0, 1]`.
    pub fn elastic_net(alpha: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(ConfigError::InvalidRegularization {
                field: "elastic_net_alpha",
                value: alpha,
            });
        }
        Ok(Self {
            kind: RegularizationType::ElasticNet,
            elastic_net_alpha: Some(alpha),
        })
    }

    pub fn kind(&self) -> RegularizationType {
        self.kind
    }

    fn alpha(&self) -> f64 {
        match self.kind {
            RegularizationType::None | RegularizationType::L2 => 0.0,
            RegularizationType::L1 => 1.0,
            RegularizationType::ElasticNet => self.elastic_net_alpha.unwrap_or(0.5),
        }
    }

    pub fn l1_weight(&self, weight: f64) -> f64 {
        match self.kind {
            RegularizationType::None => 0.0,
            _ => self.alpha() * weight,
        }
    }

    pub fn l2_weight(&self, weight: f64) -> f64 {
        match self.kind {
            RegularizationType::None => 0.0,
            _ => (1.0 - self.alpha()) * weight,
        }
    }

    pub fn has_l1(&self, weight: f64) -> bool {
        self.l1_weight(weight) > 0.0
    }

    /// `l1 * ||w||_1 + l2 / 2 * ||w||^2`.
    pub fn term_value(&self, weight: f64, coefficients: ArrayView1<f64>) -> f64 {
        let l1 = self.l1_weight(weight);
        let l2 = self.l2_weight(weight);
        let mut value = 0.0;
        if l1 > 0.0 {
            value += l1 * coefficients.iter().map(|w| w.abs()).sum::<f64>();
        }
        if l2 > 0.0 {
            value += 0.5 * l2 * coefficients.dot(&coefficients);
        }
        value
    }
}

/// Soft-threshold each coefficient toward zero by `threshold`.
pub fn soft_threshold(coefficients: &mut Array1<f64>, threshold: f64) {
    if threshold <= 0.0 {
        return;
    }
    coefficients.mapv_inplace(|w| w.signum() * (w.abs() - threshold).max(0.0));
}
