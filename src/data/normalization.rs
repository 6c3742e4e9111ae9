//! Feature normalization applied inside the objective.
//!
//! Normalized features are `x'_j = f_j (x_j - s_j)` for every feature except
//! the intercept. They are never materialized: the objective scores with the
//! effective coefficients `e_j = f_j w_j` and a scalar margin shift `-e . s`,
//! and maps gradients back with `g_j = f_j (sum dz x_j - s_j sum dz)`.

use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

use super::SparseVector;
use crate::error::{ConfigError, Result};
use crate::optimization::BoxConstraints;

/// Normalization selected in the training configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizationType {
    #[default]
    None,
    /// Zero mean, unit variance. Requires an intercept.
    Standardization,
    ScaleWithStandardDeviation,
    ScaleWithMaxMagnitude,
}

// =============================================================================
// Feature Summary
// =============================================================================

/// Column statistics of one feature shard. Absent entries count as zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSummary {
    pub count: usize,
    pub mean: Array1<f64>,
    /// Sample variance (`n - 1` denominator).
    pub variance: Array1<f64>,
    pub max_magnitude: Array1<f64>,
}

impl FeatureSummary {
    pub fn from_features<'a>(dimension: usize, features: impl IntoIterator<Item = &'a SparseVector>) -> Self {
        let mut sum = Array1::<f64>::zeros(dimension);
        let mut sum_sq = Array1::<f64>::zeros(dimension);
        let mut max_magnitude = Array1::<f64>::zeros(dimension);
        let mut count = 0usize;

        for f in features {
            count += 1;
            for (j, v) in f.iter().filter(|&(j, _)| j < dimension) {
                sum[j] += v;
                sum_sq[j] += v * v;
                max_magnitude[j] = max_magnitude[j].max(v.abs());
            }
        }

        let n = count as f64;
        let mean = if count > 0 { &sum / n } else { sum.clone() };
        let variance = if count > 1 {
            Zip::from(&sum_sq)
                .and(&mean)
                .map_collect(|&sq, &m| ((sq - n * m * m) / (n - 1.0)).max(0.0))
        } else {
            Array1::zeros(dimension)
        };

        Self {
            count,
            mean,
            variance,
            max_magnitude,
        }
    }
}

// =============================================================================
// Normalization Context
// =============================================================================

/// Per-feature scale factors and shifts, broadcast read-only to every worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationContext {
    factors: Option<Array1<f64>>,
    shifts: Option<Array1<f64>>,
    intercept_index: Option<usize>,
}

fn inverse_or_one(v: f64) -> f64 {
    if v > 0.0 && v.is_finite() {
        1.0 / v
    } else {
        1.0
    }
}

impl NormalizationContext {
    /// No scaling, no shifts.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build from column statistics.
    ///
    /// `shard_id` only names the shard in the error raised when shifts are
    /// requested without an intercept.
    pub fn build(
        kind: NormalizationType,
        summary: &FeatureSummary,
        intercept_index: Option<usize>,
        shard_id: &str,
    ) -> Result<Self> {
        let keep_intercept = |mut v: Array1<f64>, value: f64| {
            if let Some(i) = intercept_index {
                v[i] = value;
            }
            v
        };

        let (factors, shifts) = match kind {
            NormalizationType::None => (None, None),
            NormalizationType::ScaleWithStandardDeviation => {
                let f = summary.variance.mapv(|v| inverse_or_one(v.sqrt()));
                (Some(keep_intercept(f, 1.0)), None)
            }
            NormalizationType::ScaleWithMaxMagnitude => {
                let f = summary.max_magnitude.mapv(inverse_or_one);
                (Some(keep_intercept(f, 1.0)), None)
            }
            NormalizationType::Standardization => {
                if intercept_index.is_none() {
                    return Err(ConfigError::ShiftWithoutIntercept(shard_id.to_string()).into());
                }
                let f = summary.variance.mapv(|v| inverse_or_one(v.sqrt()));
                let s = summary.mean.clone();
                (Some(keep_intercept(f, 1.0)), Some(keep_intercept(s, 0.0)))
            }
        };

        Ok(Self {
            factors,
            shifts,
            intercept_index,
        })
    }

    pub fn is_identity(&self) -> bool {
        self.factors.is_none() && self.shifts.is_none()
    }

    #[inline]
    fn factor(&self, j: usize) -> f64 {
        self.factors.as_ref().map_or(1.0, |f| f[j])
    }

    #[inline]
    fn shift(&self, j: usize) -> f64 {
        self.shifts.as_ref().map_or(0.0, |s| s[j])
    }

    /// Effective coefficients `f * w` and the margin shift `-(f * w) . s`.
    pub fn effective_coefficients(&self, coefficients: ArrayView1<f64>) -> (Array1<f64>, f64) {
        let effective = match &self.factors {
            Some(f) => &coefficients * f,
            None => coefficients.to_owned(),
        };
        let margin_shift = match &self.shifts {
            Some(s) => -effective.dot(s),
            None => 0.0,
        };
        (effective, margin_shift)
    }

    /// Map `sum_i dz_i x_i` and `sum_i dz_i` to the gradient in normalized space.
    pub fn gradient_to_model_space(&self, mut sum_dz_x: Array1<f64>, sum_dz: f64) -> Array1<f64> {
        if self.is_identity() {
            return sum_dz_x;
        }
        for (j, g) in sum_dz_x.iter_mut().enumerate() {
            *g = self.factor(j) * (*g - self.shift(j) * sum_dz);
        }
        sum_dz_x
    }

    /// Map `sum h x^2`, `sum h x` and `sum h` to the Hessian diagonal in normalized space.
    pub fn hessian_diagonal_to_model_space(
        &self,
        mut sum_h_x2: Array1<f64>,
        sum_h_x: ArrayView1<f64>,
        sum_h: f64,
    ) -> Array1<f64> {
        if self.is_identity() {
            return sum_h_x2;
        }
        for (j, d) in sum_h_x2.iter_mut().enumerate() {
            let (f, s) = (self.factor(j), self.shift(j));
            *d = f * f * (*d - 2.0 * s * sum_h_x[j] + s * s * sum_h);
        }
        sum_h_x2
    }

    /// Coefficients trained in normalized space, expressed over raw features.
    pub fn model_to_original_space(&self, coefficients: ArrayView1<f64>) -> Array1<f64> {
        let (mut original, margin_shift) = self.effective_coefficients(coefficients);
        if let Some(i) = self.intercept_index {
            original[i] += margin_shift;
        }
        original
    }

    /// Inverse of [`model_to_original_space`](Self::model_to_original_space).
    pub fn original_to_model_space(&self, original: ArrayView1<f64>) -> Array1<f64> {
        let mut model = original.to_owned();
        if let Some(f) = &self.factors {
            Zip::from(&mut model).and(f).for_each(|w, &f| {
                if f != 0.0 {
                    *w /= f;
                }
            });
        }
        if let (Some(s), Some(i)) = (&self.shifts, self.intercept_index) {
            model[i] += original.dot(s);
        }
        model
    }

    /// Bounds on original-space coefficients expressed over normalized coefficients.
    ///
    /// Factors are positive, so each bound divides by its feature's factor.
    /// With shifts the original intercept mixes every coefficient, so a bound
    /// on it has no box form and is rejected.
    pub fn bounds_to_model_space(&self, bounds: &BoxConstraints) -> Result<BoxConstraints> {
        if self.is_identity() {
            return Ok(bounds.clone());
        }
        if let (Some(_), Some(i)) = (&self.shifts, self.intercept_index) {
            if bounds.bounds().contains_key(&i) {
                return Err(ConfigError::Conflict(format!(
                    "box constraint on intercept {i} cannot be combined with a shifting normalization"
                ))
                .into());
            }
        }
        let scaled = bounds
            .bounds()
            .iter()
            .map(|(&j, &(lower, upper))| {
                let f = self.factors.as_ref().and_then(|f| f.get(j).copied()).unwrap_or(1.0);
                (j, (lower / f, upper / f))
            })
            .collect();
        Ok(BoxConstraints::new(scaled)?)
    }

    /// Variances scale with the square of the factor.
    pub fn variances_to_original_space(&self, variances: ArrayView1<f64>) -> Array1<f64> {
        match &self.factors {
            Some(f) => Zip::from(variances).and(f).map_collect(|&v, &f| v * f * f),
            None => variances.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn rows() -> Vec<SparseVector> {
        vec![
            SparseVector::new([(0, 1.0), (1, 10.0), (2, 1.0)]).unwrap(),
            SparseVector::new([(0, 3.0), (2, 1.0)]).unwrap(),
            SparseVector::new([(0, 5.0), (1, -20.0), (2, 1.0)]).unwrap(),
        ]
    }

    #[test]
    fn summary_statistics() {
        let summary = FeatureSummary::from_features(3, rows().iter());
        assert_eq!(summary.count, 3);
        assert_abs_diff_eq!(summary.mean[0], 3.0);
        assert_abs_diff_eq!(summary.variance[0], 4.0);
        assert_abs_diff_eq!(summary.max_magnitude[1], 20.0);
    }

    #[test]
    fn standardization_requires_intercept() {
        let summary = FeatureSummary::from_features(3, rows().iter());
        assert!(NormalizationContext::build(NormalizationType::Standardization, &summary, None, "g").is_err());
        assert!(NormalizationContext::build(NormalizationType::Standardization, &summary, Some(2), "g").is_ok());
    }

    #[test]
    fn original_space_scores_match_normalized_scores() {
        let summary = FeatureSummary::from_features(3, rows().iter());
        let ctx = NormalizationContext::build(NormalizationType::Standardization, &summary, Some(2), "g").unwrap();
        let w = array![0.7, -0.2, 0.4];
        let original = ctx.model_to_original_space(w.view());
        let (effective, shift) = ctx.effective_coefficients(w.view());

        for x in rows() {
            assert_abs_diff_eq!(x.dot(effective.view()) + shift, x.dot(original.view()), epsilon = 1e-12);
        }

        let back = ctx.original_to_model_space(original.view());
        for j in 0..3 {
            assert_abs_diff_eq!(back[j], w[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn bounds_follow_the_scale_factor() {
        let summary = FeatureSummary::from_features(3, rows().iter());
        let ctx =
            NormalizationContext::build(NormalizationType::ScaleWithMaxMagnitude, &summary, Some(2), "g").unwrap();
        let bounds = BoxConstraints::new([(0, (0.8, 1.0)), (1, (f64::NEG_INFINITY, 2.0))].into()).unwrap();
        let scaled = ctx.bounds_to_model_space(&bounds).unwrap();
        // factors are 1/5 and 1/20
        assert_abs_diff_eq!(scaled.bounds()[&0].0, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scaled.bounds()[&0].1, 5.0, epsilon = 1e-12);
        assert_eq!(scaled.bounds()[&1].0, f64::NEG_INFINITY);
        assert_abs_diff_eq!(scaled.bounds()[&1].1, 40.0, epsilon = 1e-12);

        let standardized =
            NormalizationContext::build(NormalizationType::Standardization, &summary, Some(2), "g").unwrap();
        let intercept = BoxConstraints::new([(2, (0.0, 1.0))].into()).unwrap();
        assert!(standardized.bounds_to_model_space(&intercept).is_err());
    }

    #[test]
    fn intercept_is_never_scaled() {
        let summary = FeatureSummary::from_features(3, rows().iter());
        let ctx =
            NormalizationContext::build(NormalizationType::ScaleWithMaxMagnitude, &summary, Some(2), "g").unwrap();
        let (effective, shift) = ctx.effective_coefficients(array![1.0, 1.0, 1.0].view());
        assert_abs_diff_eq!(effective[0], 0.2);
        assert_abs_diff_eq!(effective[1], 0.05);
        assert_abs_diff_eq!(effective[2], 1.0);
        assert_eq!(shift, 0.0);
    }
}
