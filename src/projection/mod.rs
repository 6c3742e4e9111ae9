//! Projections between a coordinate's raw feature space and the space its
//! per-entity optimizers see.
//!
//! - [`IndexMapProjector`]: keeps only the features an entity uses (exact inverse).
//! - [`ProjectionMatrix`]: a shared Gaussian random projection (inverse via transpose).
//!
//! Trained models are always projected back to the original space, so
//! scoring never needs the projector.

mod index_map;
mod random;

use std::sync::Arc;

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

pub use index_map::IndexMapProjector;
pub use random::ProjectionMatrix;

use crate::data::SparseVector;

/// Projection selected in a random-effect coordinate's configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectorType {
    /// Train in the full shard space.
    Identity,
    /// Train each entity in the space of the features it uses.
    #[default]
    IndexMap,
    /// Train every entity in one shared random `dimension`-dimensional space.
    Random { dimension: usize },
}

/// A concrete projection bound to one entity.
#[derive(Debug, Clone)]
pub enum Projector {
    Identity { dimension: usize },
    IndexMap(IndexMapProjector),
    Random(Arc<ProjectionMatrix>),
}

impl Projector {
    pub fn original_dimension(&self) -> usize {
        match self {
            Projector::Identity { dimension } => *dimension,
            Projector::IndexMap(p) => p.original_dimension(),
            Projector::Random(p) => p.original_dimension(),
        }
    }

    pub fn projected_dimension(&self) -> usize {
        match self {
            Projector::Identity { dimension } => *dimension,
            Projector::IndexMap(p) => p.projected_dimension(),
            Projector::Random(p) => p.projected_dimension(),
        }
    }

    /// Where the original intercept lands after projection.
    pub fn projected_intercept_index(&self, intercept_index: Option<usize>) -> Option<usize> {
        match self {
            Projector::Identity { .. } => intercept_index,
            Projector::IndexMap(p) => intercept_index.and_then(|i| p.projected_index(i)),
            Projector::Random(p) => p.projected_intercept_index(),
        }
    }

    pub fn project_features(&self, features: &SparseVector) -> SparseVector {
        match self {
            Projector::Identity { .. } => features.clone(),
            Projector::IndexMap(p) => p.project_features(features),
            Projector::Random(p) => p.project_features(features),
        }
    }

    pub fn project_coefficients(&self, original: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Projector::Identity { .. } => original.to_owned(),
            Projector::IndexMap(p) => p.project_coefficients(original),
            Projector::Random(p) => p.project_coefficients(original),
        }
    }

    pub fn project_back(&self, projected: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Projector::Identity { .. } => projected.to_owned(),
            Projector::IndexMap(p) => p.project_back(projected),
            Projector::Random(p) => p.project_back(projected),
        }
    }

    pub fn project_variances_back(&self, projected: ArrayView1<f64>) -> Array1<f64> {
        match self {
            Projector::Identity { .. } => projected.to_owned(),
            Projector::IndexMap(p) => p.project_back(projected),
            Projector::Random(p) => p.project_variances_back(projected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn identity_is_a_no_op() {
        let projector = Projector::Identity { dimension: 3 };
        let x = SparseVector::new([(1, 2.0)]).unwrap();
        assert_eq!(projector.project_features(&x), x);
        assert_eq!(projector.project_back(array![1.0, 2.0, 3.0].view()), array![1.0, 2.0, 3.0]);
        assert_eq!(projector.projected_intercept_index(Some(2)), Some(2));
    }

    #[test]
    fn index_map_intercept_position() {
        let x = SparseVector::new([(0, 1.0), (4, 1.0)]).unwrap();
        let projector = Projector::IndexMap(IndexMapProjector::build(5, [&x], Some(4)));
        assert_eq!(projector.projected_dimension(), 2);
        assert_eq!(projector.projected_intercept_index(Some(4)), Some(1));
    }

    #[test]
    fn projector_type_serde_names() {
        let json = serde_json::to_string(&ProjectorType::Random { dimension: 4 }).unwrap();
        assert_eq!(json, r#"{"random":{"dimension":4}}"#);
        assert_eq!(serde_json::to_string(&ProjectorType::IndexMap).unwrap(), r#""index_map""#);
    }
}
