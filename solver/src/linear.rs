//! Single-process reference solver.
//!
//! Gauss–Jordan elimination with scaled partial pivoting: at step `k` the
//! pivot is the row maximising `|a[i][k]| / max_j |a[i][j]|`, the pivot row
//! is normalised and column `k` is cleared in every other row. What remains
//! is the identity with the solution in the right-hand side.

use gauss_types::{Matrix, MatrixError};

use crate::error::{Error, Result};
use crate::PIVOT_TOLERANCE;

/// Solves a clone of `matrix`; the returned matrix carries `x` as its rhs.
pub fn solve(matrix: &Matrix) -> Result<Matrix> {
    if !matrix.is_square() {
        return Err(MatrixError::InvalidArgument(format!(
            "system must be square, got {}x{}",
            matrix.rows(),
            matrix.columns()
        ))
        .into());
    }
    let n = matrix.rows();
    let mut m = matrix.clone();
    let mut scales = (0..n)
        .map(|i| Ok(m.row(i)?.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))))
        .collect::<Result<Vec<f64>>>()?;

    for k in 0..n {
        let mut pivot = k;
        let mut best = -1.0;
        for i in k..n {
            if scales[i] == 0.0 {
                continue;
            }
            let ratio = m.get(i, k)?.abs() / scales[i];
            if ratio > best {
                best = ratio;
                pivot = i;
            }
        }
        if m.get(pivot, k)?.abs() < PIVOT_TOLERANCE {
            return Err(Error::SingularMatrix { step: k });
        }

        m.swap_rows(k, pivot)?;
        scales.swap(k, pivot);
        let lead = m.get(k, k)?;
        m.scale_row(k, 1.0 / lead)?;

        for i in (0..n).filter(|&i| i != k) {
            let factor = m.get(i, k)?;
            if factor != 0.0 {
                m.subtract_row(i, k, factor)?;
            }
        }
    }
    Ok(m)
}

pub fn solution(matrix: &Matrix) -> Result<Vec<f64>> {
    Ok(solve(matrix)?.rhs_vector().to_vec())
}
