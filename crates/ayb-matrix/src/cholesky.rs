//! Cholesky decomposition and the inverse of a symmetric
//! positive-definite matrix built on top of it.

use crate::{Matrix, MatrixError, Result};

/// Lower-triangular Cholesky factor `L` of a symmetric positive-definite
/// `a`, such that `L * Lᵀ == a`. Fails with `Singular` if a diagonal
/// pivot is non-positive (i.e. `a` is not SPD within floating-point
/// tolerance).
pub fn cholesky(a: &Matrix) -> Result<Matrix> {
    if !a.is_square() {
        return Err(MatrixError::InvalidDim);
    }
    let n = a.rows();
    let mut l = Matrix::new(n, n);
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a.get(i, j);
            for k in 0..j {
                sum -= l.get(i, k) * l.get(j, k);
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(MatrixError::Singular);
                }
                l.set(i, j, sum.sqrt());
            } else {
                l.set(i, j, sum / l.get(j, j));
            }
        }
    }
    Ok(l)
}

/// Inverse of a symmetric positive-definite matrix, computed by
/// Cholesky-factoring it and then inverting the triangular factor.
pub fn invert_via_cholesky(a: &Matrix) -> Result<Matrix> {
    let l = cholesky(a)?;
    let n = l.rows();

    // Invert the lower-triangular factor by forward substitution.
    let mut l_inv = Matrix::new(n, n);
    for i in 0..n {
        l_inv.set(i, i, 1.0 / l.get(i, i));
        for j in 0..i {
            let mut sum = 0.0;
            for k in j..i {
                sum += l.get(i, k) * l_inv.get(k, j);
            }
            l_inv.set(i, j, -sum / l.get(i, i));
        }
    }

    // a^-1 = (L^-1)^T * L^-1
    let mut l_inv_t = l_inv.clone();
    l_inv_t.transpose_in_place();
    l_inv_t.matmul(&l_inv)
}
