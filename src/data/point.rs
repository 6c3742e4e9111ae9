//! Labeled training examples and the per-problem training set.

use std::sync::Arc;

use ndarray::ArrayView1;

use super::SparseVector;
use crate::error::{GameError, Result};

/// One training example: label, sparse features, prior score, and weight.
///
/// Features are shared through an `Arc` so offsets can be rewritten every
/// coordinate-descent round without copying feature data.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPoint {
    label: f64,
    features: Arc<SparseVector>,
    offset: f64,
    weight: f64,
}

impl LabeledPoint {
    /// Create a point with zero offset and unit weight.
    pub fn new(label: f64, features: impl Into<Arc<SparseVector>>) -> Self {
        Self {
            label,
            features: features.into(),
            offset: 0.0,
            weight: 1.0,
        }
    }

    /// Create a point with an explicit offset and weight.
    ///
    /// The weight must be finite and non-negative.
    pub fn with_offset_and_weight(
        label: f64,
        features: impl Into<Arc<SparseVector>>,
        offset: f64,
        weight: f64,
    ) -> Result<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(GameError::Data(format!(
                "example weight must be finite and non-negative, got {weight}"
            )));
        }
        Ok(Self {
            label,
            features: features.into(),
            offset,
            weight,
        })
    }

    #[inline]
    pub fn label(&self) -> f64 {
        self.label
    }

    #[inline]
    pub fn features(&self) -> &SparseVector {
        &self.features
    }

    #[inline]
    pub fn shared_features(&self) -> &Arc<SparseVector> {
        &self.features
    }

    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Same example with `delta` added to its offset.
    #[inline]
    pub fn shifted(&self, delta: f64) -> Self {
        Self {
            offset: self.offset + delta,
            ..self.clone()
        }
    }

    /// Same label, offset and weight over different features.
    #[inline]
    pub(crate) fn with_features(&self, features: Arc<SparseVector>) -> Self {
        Self {
            features,
            ..*self
        }
    }

    /// Same example with its weight multiplied by `factor`.
    #[inline]
    pub(crate) fn reweighted(&self, factor: f64) -> Self {
        Self {
            weight: self.weight * factor,
            ..self.clone()
        }
    }

    /// `features . coefficients + offset`.
    #[inline]
    pub fn margin(&self, coefficients: ArrayView1<f64>) -> f64 {
        self.features.dot(coefficients) + self.offset
    }
}

// =============================================================================
// TrainingData
// =============================================================================

/// The examples one optimization problem is solved over, with the dimension
/// of the coefficient vector they are scored against.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    points: Vec<LabeledPoint>,
    dimension: usize,
}

impl TrainingData {
    /// Validates that every feature index is below `dimension`.
    pub fn new(points: Vec<LabeledPoint>, dimension: usize) -> Result<Self> {
        if let Some(max) = points.iter().filter_map(|p| p.features().max_index()).max() {
            if max >= dimension {
                return Err(GameError::DimensionMismatch {
                    expected: dimension,
                    got: max + 1,
                });
            }
        }
        Ok(Self { points, dimension })
    }

    pub(crate) fn new_unchecked(points: Vec<LabeledPoint>, dimension: usize) -> Self {
        Self { points, dimension }
    }

    #[inline]
    pub fn points(&self) -> &[LabeledPoint] {
        &self.points
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of example weights.
    pub fn total_weight(&self) -> f64 {
        self.points.iter().map(LabeledPoint::weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn features() -> SparseVector {
        SparseVector::new([(0, 2.0), (1, 1.0)]).unwrap()
    }

    #[test]
    fn margin_includes_offset() {
        let p = LabeledPoint::with_offset_and_weight(1.0, features(), 0.5, 2.0).unwrap();
        assert_eq!(p.margin(array![1.0, -1.0].view()), 1.5);
        assert_eq!(p.shifted(1.0).offset(), 1.5);
        assert_eq!(p.weight(), 2.0);
    }

    #[test]
    fn negative_or_nan_weight_rejected() {
        assert!(LabeledPoint::with_offset_and_weight(0.0, features(), 0.0, -1.0).is_err());
        assert!(LabeledPoint::with_offset_and_weight(0.0, features(), 0.0, f64::NAN).is_err());
        assert!(LabeledPoint::with_offset_and_weight(0.0, features(), 0.0, 0.0).is_ok());
    }

    #[test]
    fn training_data_checks_dimension() {
        let points = vec![LabeledPoint::new(1.0, features())];
        assert!(TrainingData::new(points.clone(), 2).is_ok());
        let err = TrainingData::new(points, 1).unwrap_err();
        assert!(matches!(err, GameError::DimensionMismatch { expected: 1, got: 2 }));
    }
}
