//! Pointwise losses of a GLM margin.
//!
//! Each loss `l(z, y)` is a function of the margin `z = x . w + offset` and
//! the label `y`. Objectives need `l`, `dl/dz` and, for second-order
//! methods, `d2l/dz2`.
//!
//! # Available Losses
//!
//! - [`LogisticLoss`]: labels in `{0, 1}`
//! - [`SquaredLoss`]: `(z - y)^2 / 2`
//! - [`PoissonLoss`]: `exp(z) - y z`
//! - [`SmoothedHingeLoss`]: Rennie's smoothed hinge, labels in `{0, 1}`; not twice differentiable

use serde::{Deserialize, Serialize};

/// A loss of the margin.
pub trait PointwiseLoss: Send + Sync {
    /// Loss value and first derivative with respect to the margin.
    fn loss_and_dz(&self, margin: f64, label: f64) -> (f64, f64);

    /// Second derivative with respect to the margin.
    fn dzz(&self, margin: f64, label: f64) -> f64;

    /// Whether `dzz` is a true second derivative everywhere.
    fn is_twice_differentiable(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// `log(1 + exp(t))` without overflow.
#[inline]
pub(crate) fn softplus(t: f64) -> f64 {
    if t > 0.0 {
        t + (-t).exp().ln_1p()
    } else {
        t.exp().ln_1p()
    }
}

#[inline]
pub(crate) fn sigmoid(t: f64) -> f64 {
    if t >= 0.0 {
        1.0 / (1.0 + (-t).exp())
    } else {
        let e = t.exp();
        e / (1.0 + e)
    }
}

// =============================================================================
// Logistic
// =============================================================================

/// Binary log-loss.
///
/// Written as `y softplus(-z) + (1 - y) softplus(z)` so that neither term
/// cancels catastrophically at large margins.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogisticLoss;

impl PointwiseLoss for LogisticLoss {
    #[inline]
    fn loss_and_dz(&self, margin: f64, label: f64) -> (f64, f64) {
        let loss = label * softplus(-margin) + (1.0 - label) * softplus(margin);
        let dz = (1.0 - label) * sigmoid(margin) - label * sigmoid(-margin);
        (loss, dz)
    }

    #[inline]
    fn dzz(&self, margin: f64, _label: f64) -> f64 {
        let p = sigmoid(margin);
        p * (1.0 - p)
    }

    fn name(&self) -> &'static str {
        "logistic"
    }
}

// =============================================================================
// Squared
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SquaredLoss;

impl PointwiseLoss for SquaredLoss {
    #[inline]
    fn loss_and_dz(&self, margin: f64, label: f64) -> (f64, f64) {
        let delta = margin - label;
        (0.5 * delta * delta, delta)
    }

    #[inline]
    fn dzz(&self, _margin: f64, _label: f64) -> f64 {
        1.0
    }

    fn name(&self) -> &'static str {
        "squared"
    }
}

// =============================================================================
// Poisson
// =============================================================================

/// Negative Poisson log-likelihood with log link, dropping the `log(y!)` term.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoissonLoss;

impl PointwiseLoss for PoissonLoss {
    #[inline]
    fn loss_and_dz(&self, margin: f64, label: f64) -> (f64, f64) {
        let mean = margin.exp();
        (mean - label * margin, mean - label)
    }

    #[inline]
    fn dzz(&self, margin: f64, _label: f64) -> f64 {
        margin.exp()
    }

    fn name(&self) -> &'static str {
        "poisson"
    }
}

// =============================================================================
// Smoothed Hinge
// =============================================================================

/// Smoothed hinge loss of `t = y' z` with `y' = +1` for positive labels and `-1` otherwise:
///
/// ```text
/// l(t) = 0.5 - t          if t <= 0
///        0.5 (1 - t)^2    if 0 < t < 1
///        0                if t >= 1
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothedHingeLoss;

impl PointwiseLoss for SmoothedHingeLoss {
    #[inline]
    fn loss_and_dz(&self, margin: f64, label: f64) -> (f64, f64) {
        let sign = if label > 0.5 { 1.0 } else { -1.0 };
        let t = sign * margin;
        if t <= 0.0 {
            (0.5 - t, -sign)
        } else if t < 1.0 {
            (0.5 * (1.0 - t) * (1.0 - t), sign * (t - 1.0))
        } else {
            (0.0, 0.0)
        }
    }

    /// Piecewise curvature; undefined at the two knots.
    #[inline]
    fn dzz(&self, margin: f64, label: f64) -> f64 {
        let sign = if label > 0.5 { 1.0 } else { -1.0 };
        let t = sign * margin;
        if t > 0.0 && t < 1.0 {
            1.0
        } else {
            0.0
        }
    }

    fn is_twice_differentiable(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "smoothed_hinge"
    }
}

// =============================================================================
// Loss Enum
// =============================================================================

/// Static dispatch over the available losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    Logistic,
    Squared,
    Poisson,
    SmoothedHinge,
}

impl PointwiseLoss for Loss {
    #[inline]
    fn loss_and_dz(&self, margin: f64, label: f64) -> (f64, f64) {
        match self {
            Loss::Logistic => LogisticLoss.loss_and_dz(margin, label),
            Loss::Squared => SquaredLoss.loss_and_dz(margin, label),
            Loss::Poisson => PoissonLoss.loss_and_dz(margin, label),
            Loss::SmoothedHinge => SmoothedHingeLoss.loss_and_dz(margin, label),
        }
    }

    #[inline]
    fn dzz(&self, margin: f64, label: f64) -> f64 {
        match self {
            Loss::Logistic => LogisticLoss.dzz(margin, label),
            Loss::Squared => SquaredLoss.dzz(margin, label),
            Loss::Poisson => PoissonLoss.dzz(margin, label),
            Loss::SmoothedHinge => SmoothedHingeLoss.dzz(margin, label),
        }
    }

    fn is_twice_differentiable(&self) -> bool {
        !matches!(self, Loss::SmoothedHinge)
    }

    fn name(&self) -> &'static str {
        match self {
            Loss::Logistic => LogisticLoss.name(),
            Loss::Squared => SquaredLoss.name(),
            Loss::Poisson => PoissonLoss.name(),
            Loss::SmoothedHinge => SmoothedHingeLoss.name(),
        }
    }
}

impl Loss {
    /// Loss value only.
    #[inline]
    pub fn loss(&self, margin: f64, label: f64) -> f64 {
        self.loss_and_dz(margin, label).0
    }
}
