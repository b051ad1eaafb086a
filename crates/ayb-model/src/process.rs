//! C2: the intensity-processing kernel used everywhere the model needs
//! `processed = M⁻¹ · (I − N) · P⁻¹`.

use ayb_matrix::{Matrix, Result};

/// Computes `out = M⁻¹ · (I − N) · P⁻¹` for one cluster and writes the
/// result into `out`, resizing it if needed. `m_inv_t` and `p_inv_t`
/// are the *transposes* of `M⁻¹` and `P⁻¹` respectively — callers
/// precompute and reuse them across every cluster in a sub-tile so the
/// inverse and its transpose aren't recomputed per cluster.
///
/// Does not mutate `i`, `m_inv_t`, `p_inv_t` or `n`.
pub fn process_into(
    i: &Matrix,
    m_inv_t: &Matrix,
    p_inv_t: &Matrix,
    n: &Matrix,
    out: &mut Matrix,
) -> Result<()> {
    let mut diff = i.clone();
    diff.add_assign(&negate(n))?;
    let m_inv = m_inv_t.transposed();
    let p_inv = p_inv_t.transposed();
    let left = m_inv.matmul(&diff)?;
    let result = left.matmul(&p_inv)?;
    out.copy_into(&result);
    Ok(())
}

/// Same as [`process_into`] but allocates and returns a fresh matrix.
pub fn process(i: &Matrix, m_inv_t: &Matrix, p_inv_t: &Matrix, n: &Matrix) -> Result<Matrix> {
    let mut out = Matrix::new(i.rows(), i.cols());
    process_into(i, m_inv_t, p_inv_t, n, &mut out)?;
    Ok(out)
}

fn negate(m: &Matrix) -> Matrix {
    let mut out = m.clone();
    out.scale(-1.0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ayb_matrix::Matrix;

    #[test]
    fn process_inverts_a_known_forward_model() {
        // Pick M, P in SL(n) (unit determinant) so we can check an
        // exact round trip: I = M * S * P + N, then process(I) should
        // recover S exactly (lambda folded into S here for simplicity).
        let m = Matrix::from_array(2, 2, &[1.0, 0.5, 0.0, 1.0]).unwrap(); // det = 1
        let p = Matrix::from_array(2, 2, &[1.0, 0.0, 0.3, 1.0]).unwrap(); // det = 1
        let n = Matrix::from_array(2, 2, &[0.1, 0.2, -0.1, 0.05]).unwrap();
        let s = Matrix::from_array(2, 2, &[2.0, 0.0, 0.0, 3.0]).unwrap();

        let forward = m.matmul(&s).unwrap().matmul(&p).unwrap();
        let mut i_mat = forward.clone();
        i_mat.add_assign(&n).unwrap();

        let m_inv_t = m.invert().unwrap().transposed();
        let p_inv_t = p.invert().unwrap().transposed();
        let recovered = process(&i_mat, &m_inv_t, &p_inv_t, &n).unwrap();

        for r in 0..2 {
            for c in 0..2 {
                assert_abs_diff_eq!(recovered.get(r, c), s.get(r, c), epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn process_into_reuses_and_resizes_output() {
        let i_mat = Matrix::identity(2);
        let m_inv_t = Matrix::identity(2);
        let p_inv_t = Matrix::identity(2);
        let n = Matrix::new(2, 2);
        let mut out = Matrix::new(5, 5); // wrong shape on purpose
        process_into(&i_mat, &m_inv_t, &p_inv_t, &n, &mut out).unwrap();
        assert_eq!(out.rows(), 2);
        assert_eq!(out.cols(), 2);
        assert_eq!(out, i_mat);
    }
}
