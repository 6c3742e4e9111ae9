//! Per-example score vectors exchanged between coordinates.

use std::ops::{Add, AddAssign, Sub};

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Dense per-example scores, indexed by the example's position in its dataset.
///
/// A `NaN` entry marks an example the producing model could not score; the
/// evaluation layer substitutes its configured default score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scores(Array1<f64>);

impl Scores {
    pub fn zeros(n: usize) -> Self {
        Self(Array1::zeros(n))
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Self(Array1::from(values))
    }

    pub fn from_array(values: Array1<f64>) -> Self {
        Self(values)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    #[inline]
    pub fn get(&self, i: usize) -> f64 {
        self.0[i]
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.0
    }
}

impl Add for &Scores {
    type Output = Scores;

    fn add(self, rhs: &Scores) -> Scores {
        Scores(&self.0 + &rhs.0)
    }
}

impl Sub for &Scores {
    type Output = Scores;

    fn sub(self, rhs: &Scores) -> Scores {
        Scores(&self.0 - &rhs.0)
    }
}

impl AddAssign<&Scores> for Scores {
    fn add_assign(&mut self, rhs: &Scores) {
        self.0 += &rhs.0;
    }
}
