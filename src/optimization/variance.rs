//! Coefficient variance estimates from the Hessian at the optimum.

use faer::linalg::solvers::Solve;
use faer::{Mat, Side};
use ndarray::{Array1, Array2, ArrayView1};

use crate::function::TwiceDiffObjective;

/// Added to the Hessian diagonal before inversion.
const EPSILON: f64 = 1e-12;

/// `1 / (H_ii + eps)`.
pub fn simple_variances(hessian_diagonal: Array1<f64>) -> Array1<f64> {
    hessian_diagonal.mapv(|h| 1.0 / (h + EPSILON))
}

/// Diagonal of `H^-1`, with `H` assembled column by column from
/// Hessian-vector products. `None` if `H` is not positive definite.
pub fn full_variances<F: TwiceDiffObjective>(
    objective: &F,
    data: &F::Data,
    coefficients: ArrayView1<f64>,
) -> Option<Array1<f64>> {
    let n = coefficients.len();
    let mut hessian = Array2::zeros((n, n));
    let mut unit = Array1::zeros(n);
    for j in 0..n {
        unit[j] = 1.0;
        let column = objective.hessian_vector(data, coefficients, unit.view());
        hessian.column_mut(j).assign(&column);
        unit[j] = 0.0;
    }
    let symmetric = (&hessian + &hessian.t()) * 0.5;
    inverse_diagonal(&symmetric)
}

/// Diagonal of the inverse of a symmetric positive-definite matrix via faer's LLT.
pub(crate) fn inverse_diagonal(matrix: &Array2<f64>) -> Option<Array1<f64>> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let n = matrix.nrows();
    let hessian = Mat::from_fn(n, n, |i, j| matrix[[i, j]] + if i == j { EPSILON } else { 0.0 });
    let llt = hessian.as_ref().llt(Side::Lower).ok()?;

    let mut inverse = Mat::<f64>::identity(n, n);
    llt.solve_in_place(inverse.as_mut());
    Some((0..n).map(|j| inverse[(j, j)]).collect())
}
