//! Least-squares solve via one-sided Jacobi SVD.
//!
//! The C original of this kernel takes a caller-supplied scratch
//! buffer sized `rows*cols + min(rows,cols)`; in Rust the allocator
//! already gives us that without an unsafe workspace pointer, so
//! `svd_solve` just allocates what it needs internally. See
//! `DESIGN.md` for this deviation.

use crate::{Matrix, MatrixError, Result};

const MAX_SWEEPS: usize = 60;
const CONVERGENCE_EPS: f64 = 1e-14;

/// One-sided Jacobi SVD of `a` (`m x n`, `m >= n`): returns `(u, s, v)`
/// with `a == u * diag(s) * vᵀ`, `u` is `m x n` with orthonormal
/// columns, `v` is `n x n` orthogonal.
fn jacobi_svd_tall(a: &Matrix) -> (Matrix, Vec<f64>, Matrix) {
    let m = a.rows();
    let n = a.cols();
    let mut work = a.clone();
    let mut v = Matrix::identity(n);

    for _sweep in 0..MAX_SWEEPS {
        let mut off_diag = 0.0_f64;
        for p in 0..n {
            for q in (p + 1)..n {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = 0.0;
                for r in 0..m {
                    let ap = work.get(r, p);
                    let aq = work.get(r, q);
                    alpha += ap * ap;
                    beta += aq * aq;
                    gamma += ap * aq;
                }
                off_diag = off_diag.max(gamma.abs());
                if gamma.abs() <= CONVERGENCE_EPS * (alpha * beta).sqrt().max(1e-300) {
                    continue;
                }
                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = if zeta >= 0.0 {
                    1.0 / (zeta + (1.0 + zeta * zeta).sqrt())
                } else {
                    -1.0 / (-zeta + (1.0 + zeta * zeta).sqrt())
                };
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                for r in 0..m {
                    let ap = work.get(r, p);
                    let aq = work.get(r, q);
                    work.set(r, p, c * ap - s * aq);
                    work.set(r, q, s * ap + c * aq);
                }
                for r in 0..n {
                    let vp = v.get(r, p);
                    let vq = v.get(r, q);
                    v.set(r, p, c * vp - s * vq);
                    v.set(r, q, s * vp + c * vq);
                }
            }
        }
        if off_diag < CONVERGENCE_EPS {
            break;
        }
    }

    let mut s = vec![0.0; n];
    let mut u = Matrix::new(m, n);
    for j in 0..n {
        let mut norm_sq = 0.0;
        for r in 0..m {
            let v = work.get(r, j);
            norm_sq += v * v;
        }
        let sigma = norm_sq.sqrt();
        s[j] = sigma;
        if sigma > 1e-300 {
            for r in 0..m {
                u.set(r, j, work.get(r, j) / sigma);
            }
        }
    }
    (u, s, v)
}

/// Full SVD of a general `m x n` matrix, handling the `m < n` case by
/// transposing.
fn jacobi_svd(a: &Matrix) -> (Matrix, Vec<f64>, Matrix) {
    if a.rows() >= a.cols() {
        jacobi_svd_tall(a)
    } else {
        let at = a.transposed();
        let (u2, s, v2) = jacobi_svd_tall(&at);
        // a = v2 * s * u2^T
        (v2, s, u2)
    }
}

/// Solves `lhs * x = rhs` in the least-squares sense via SVD pseudo-
/// inverse; `rhs` is overwritten with `x` (its row count becomes
/// `lhs.cols()`, its column count is unchanged).
///
/// Singular values below `max_singular * 1e-10` are treated as zero
/// (Tikhonov-free truncated pseudo-inverse), which is what makes this
/// solve well-defined even when `lhs` is singular or near-singular —
/// callers that need to detect that condition should inspect the
/// returned singular value spread via [`svd_solve_with_singular_values`].
pub fn svd_solve(lhs: &Matrix, rhs: &mut Matrix) -> Result<()> {
    let (x, _) = svd_solve_with_singular_values(lhs, rhs)?;
    *rhs = x;
    Ok(())
}

/// Same as [`svd_solve`] but also returns the singular values of
/// `lhs`, for callers that want to inspect the conditioning of the
/// system directly rather than relying on the truncated pseudo-inverse.
pub fn svd_solve_with_singular_values(lhs: &Matrix, rhs: &Matrix) -> Result<(Matrix, Vec<f64>)> {
    if lhs.rows() != rhs.rows() {
        return Err(MatrixError::InvalidDim);
    }
    let (u, s, v) = jacobi_svd(lhs);
    let max_sigma = s.iter().cloned().fold(0.0_f64, f64::max);
    let tol = max_sigma * 1e-10;

    // x = V * diag(1/sigma) * U^T * rhs
    let mut ut_rhs = Matrix::new(u.cols(), rhs.cols());
    for j in 0..u.cols() {
        for col in 0..rhs.cols() {
            let mut acc = 0.0;
            for r in 0..u.rows() {
                acc += u.get(r, j) * rhs.get(r, col);
            }
            ut_rhs.set(j, col, acc);
        }
    }
    for j in 0..s.len() {
        let inv_sigma = if s[j] > tol { 1.0 / s[j] } else { 0.0 };
        for col in 0..ut_rhs.cols() {
            let v = ut_rhs.get(j, col) * inv_sigma;
            ut_rhs.set(j, col, v);
        }
    }
    let x = v.matmul(&ut_rhs)?;
    Ok((x, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn solves_square_well_conditioned_system() {
        // [[2,0],[0,3]] x = [4, 9] -> x = [2, 3]
        let lhs = Matrix::from_array(2, 2, &[2.0, 0.0, 0.0, 3.0]).unwrap();
        let mut rhs = Matrix::from_array(2, 1, &[4.0, 9.0]).unwrap();
        svd_solve(&lhs, &mut rhs).unwrap();
        assert_abs_diff_eq!(rhs.get(0, 0), 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(rhs.get(1, 0), 3.0, epsilon = 1e-8);
    }

    #[test]
    fn solves_overdetermined_system_in_ls_sense() {
        // Fit y = a*x through points (0,1),(1,2),(2,3) -> exact line a=1,b=1.
        let lhs = Matrix::from_array(3, 2, &[0.0, 1.0, 1.0, 1.0, 2.0, 1.0]).unwrap();
        let mut rhs = Matrix::from_array(3, 1, &[1.0, 2.0, 3.0]).unwrap();
        svd_solve(&lhs, &mut rhs).unwrap();
        assert_abs_diff_eq!(rhs.get(0, 0), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rhs.get(1, 0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn singular_values_reveal_rank_deficiency() {
        let lhs = Matrix::from_array(2, 2, &[1.0, 2.0, 2.0, 4.0]).unwrap();
        let rhs = Matrix::from_array(2, 1, &[1.0, 2.0]).unwrap();
        let (_, s) = svd_solve_with_singular_values(&lhs, &rhs).unwrap();
        let min = s.iter().cloned().fold(f64::MAX, f64::min);
        let max = s.iter().cloned().fold(0.0_f64, f64::max);
        assert!(min / max < 1e-8);
    }
}
