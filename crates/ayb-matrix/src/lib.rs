//! Dense row-major matrix kernel.
//!
//! Every other crate in the workspace builds on the small set of
//! operations exposed here: allocation, slicing, transpose, Cholesky
//! and general inversion, an SVD-based least-squares solve, and the
//! determinant-preserving rescale used by the MPN estimator. Nothing
//! here depends on any other workspace crate.

mod cholesky;
mod svd;

use std::fmt;

pub use cholesky::{cholesky, invert_via_cholesky};
pub use svd::{svd_solve, svd_solve_with_singular_values};

/// Errors surfaced by the matrix kernel. All of them are fatal for
/// whatever caller-level operation was in progress; none of them are
/// ever silently swallowed inside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MatrixError {
    /// Shapes are inconsistent (wrong length, non-square where square
    /// is required, mismatched operand dimensions, ...).
    #[error("invalid matrix dimensions")]
    InvalidDim,
    /// A square matrix required to be invertible was numerically
    /// singular.
    #[error("matrix is singular")]
    Singular,
    /// `normalise_to_unit_det` found `|det(A)|^(1/n)` below the caller's
    /// tolerance.
    #[error("matrix is near-singular")]
    NearSingular,
}

pub type Result<T> = std::result::Result<T, MatrixError>;

/// A dense, row-major matrix of `f64`.
///
/// Storage is a flat `Vec<f64>` of length `rows * cols`; `(r, c)`
/// lives at index `r * cols + c`. The kernel never exposes a `Matrix`
/// whose storage length disagrees with `rows * cols`.
#[derive(Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Allocates a zero-filled `rows x cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a matrix by copying `rows * cols` values out of `src` in
    /// row-major order.
    pub fn from_array(rows: usize, cols: usize, src: &[f64]) -> Result<Self> {
        if src.len() != rows * cols {
            return Err(MatrixError::InvalidDim);
        }
        Ok(Matrix {
            rows,
            cols,
            data: src.to_vec(),
        })
    }

    /// The identity matrix of order `n`.
    pub fn identity(n: usize) -> Self {
        let mut m = Matrix::new(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.cols + c] = v;
    }

    /// Copies `src`'s contents into `self`, reallocating if the shapes
    /// differ.
    pub fn copy_into(&mut self, src: &Matrix) {
        if self.rows != src.rows || self.cols != src.cols {
            self.rows = src.rows;
            self.cols = src.cols;
            self.data.resize(src.data.len(), 0.0);
        }
        self.data.copy_from_slice(&src.data);
    }

    /// Returns a row as a fresh vector.
    pub fn row(&self, r: usize) -> Vec<f64> {
        self.data[r * self.cols..(r + 1) * self.cols].to_vec()
    }

    /// Returns a column as a fresh vector.
    pub fn column(&self, c: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, c)).collect()
    }

    /// `Aᵀ`. Square matrices transpose in place (storage is reused);
    /// rectangular ones reallocate.
    pub fn transpose_in_place(&mut self) {
        if self.rows == self.cols {
            let n = self.rows;
            for r in 0..n {
                for c in (r + 1)..n {
                    self.data.swap(r * n + c, c * n + r);
                }
            }
        } else {
            let mut out = Matrix::new(self.cols, self.rows);
            for r in 0..self.rows {
                for c in 0..self.cols {
                    out.set(c, r, self.get(r, c));
                }
            }
            self.rows = out.rows;
            self.cols = out.cols;
            self.data = out.data;
        }
    }

    /// Returns the transpose without mutating `self`.
    pub fn transposed(&self) -> Matrix {
        let mut out = self.clone();
        out.transpose_in_place();
        out
    }

    /// Multiplies every entry by `f`.
    pub fn scale(&mut self, f: f64) {
        for v in self.data.iter_mut() {
            *v *= f;
        }
    }

    /// `self + rhs`, element-wise. Shapes must match.
    pub fn add_assign(&mut self, rhs: &Matrix) -> Result<()> {
        if self.rows != rhs.rows || self.cols != rhs.cols {
            return Err(MatrixError::InvalidDim);
        }
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Dense matrix product `self * rhs`.
    pub fn matmul(&self, rhs: &Matrix) -> Result<Matrix> {
        if self.cols != rhs.rows {
            return Err(MatrixError::InvalidDim);
        }
        let mut out = Matrix::new(self.rows, rhs.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(i, k);
                if a == 0.0 {
                    continue;
                }
                for j in 0..rhs.cols {
                    out[(i, j)] += a * rhs.get(k, j);
                }
            }
        }
        Ok(out)
    }

    /// Appends columns `[col_start, col_end]` (inclusive) of `src` to
    /// `dst`, creating `dst` if it is empty (0 rows and 0 cols).
    pub fn append_columns(
        dst: &mut Matrix,
        src: &Matrix,
        col_start: usize,
        col_end_inclusive: usize,
    ) -> Result<()> {
        if col_end_inclusive >= src.cols || col_start > col_end_inclusive {
            return Err(MatrixError::InvalidDim);
        }
        let n = col_end_inclusive - col_start + 1;
        if dst.rows == 0 && dst.cols == 0 {
            *dst = Matrix::new(src.rows, 0);
        }
        if dst.rows != src.rows {
            return Err(MatrixError::InvalidDim);
        }
        let new_cols = dst.cols + n;
        let mut out = Matrix::new(dst.rows, new_cols);
        for r in 0..dst.rows {
            for c in 0..dst.cols {
                out.set(r, c, dst.get(r, c));
            }
            for (j, c) in (col_start..=col_end_inclusive).enumerate() {
                out.set(r, dst.cols + j, src.get(r, c));
            }
        }
        *dst = out;
        Ok(())
    }

    /// Extracts the `n` diagonal `b x b` blocks of a `b*n x b*n`
    /// matrix, returning them as a `Vec` of `b x b` matrices.
    pub fn block_diagonal(&self, n: usize) -> Result<Vec<Matrix>> {
        if !self.is_square() || n == 0 || self.rows % n != 0 {
            return Err(MatrixError::InvalidDim);
        }
        let b = self.rows / n;
        let mut out = Vec::with_capacity(n);
        for block in 0..n {
            let mut m = Matrix::new(b, b);
            for r in 0..b {
                for c in 0..b {
                    m.set(r, c, self.get(block * b + r, block * b + c));
                }
            }
            out.push(m);
        }
        Ok(out)
    }

    /// The bilinear form `xᵀ M y`. `x` has length `M.rows`, `y` has
    /// length `M.cols`.
    pub fn x_m_y(x: &[f64], m: &Matrix, y: &[f64]) -> Result<f64> {
        if x.len() != m.rows || y.len() != m.cols {
            return Err(MatrixError::InvalidDim);
        }
        let mut acc = 0.0;
        for r in 0..m.rows {
            if x[r] == 0.0 {
                continue;
            }
            let mut row_dot = 0.0;
            for c in 0..m.cols {
                row_dot += m.get(r, c) * y[c];
            }
            acc += x[r] * row_dot;
        }
        Ok(acc)
    }

    /// Determinant via Gaussian elimination with partial pivoting.
    /// `INVALID_DIM` for non-square matrices.
    pub fn determinant(&self) -> Result<f64> {
        if !self.is_square() {
            return Err(MatrixError::InvalidDim);
        }
        let n = self.rows;
        let mut a = self.data.clone();
        let mut det = 1.0;
        for col in 0..n {
            let mut pivot = col;
            let mut best = a[col * n + col].abs();
            for row in (col + 1)..n {
                let v = a[row * n + col].abs();
                if v > best {
                    best = v;
                    pivot = row;
                }
            }
            if best < 1e-300 {
                return Ok(0.0);
            }
            if pivot != col {
                for k in 0..n {
                    a.swap(col * n + k, pivot * n + k);
                }
                det = -det;
            }
            let pv = a[col * n + col];
            det *= pv;
            for row in (col + 1)..n {
                let factor = a[row * n + col] / pv;
                if factor == 0.0 {
                    continue;
                }
                for k in col..n {
                    a[row * n + k] -= factor * a[col * n + k];
                }
            }
        }
        Ok(det)
    }

    /// General inverse via Gauss-Jordan elimination with partial
    /// pivoting. Fails with `Singular` if a pivot is numerically zero.
    pub fn invert(&self) -> Result<Matrix> {
        if !self.is_square() {
            return Err(MatrixError::InvalidDim);
        }
        let n = self.rows;
        let mut a = self.data.clone();
        let mut inv = Matrix::identity(n).data;
        for col in 0..n {
            let mut pivot = col;
            let mut best = a[col * n + col].abs();
            for row in (col + 1)..n {
                let v = a[row * n + col].abs();
                if v > best {
                    best = v;
                    pivot = row;
                }
            }
            if best < 1e-12 {
                return Err(MatrixError::Singular);
            }
            if pivot != col {
                for k in 0..n {
                    a.swap(col * n + k, pivot * n + k);
                    inv.swap(col * n + k, pivot * n + k);
                }
            }
            let pv = a[col * n + col];
            for k in 0..n {
                a[col * n + k] /= pv;
                inv[col * n + k] /= pv;
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = a[row * n + col];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..n {
                    a[row * n + k] -= factor * a[col * n + k];
                    inv[row * n + k] -= factor * inv[col * n + k];
                }
            }
        }
        Ok(Matrix {
            rows: n,
            cols: n,
            data: inv,
        })
    }

    /// Scales `self` so that `|det(self)|^(1/n) == 1`, returning the
    /// scale factor `d` that was divided out. Fails with
    /// `NearSingular` if `d < eps`.
    pub fn normalise_to_unit_det(&mut self, eps: f64) -> Result<f64> {
        if !self.is_square() {
            return Err(MatrixError::InvalidDim);
        }
        let n = self.rows as i32;
        let det = self.determinant()?.abs();
        if det == 0.0 {
            return Err(MatrixError::NearSingular);
        }
        let d = det.powf(1.0 / n as f64);
        if d < eps {
            return Err(MatrixError::NearSingular);
        }
        self.scale(1.0 / d);
        Ok(d)
    }
}

impl std::ops::Index<(usize, usize)> for Matrix {
    type Output = f64;
    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matrix[{}x{}]", self.rows, self.cols)?;
        for r in 0..self.rows {
            writeln!(f, "  {:?}", self.row(r))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_array_rejects_wrong_length() {
        assert_eq!(
            Matrix::from_array(2, 2, &[1.0, 2.0, 3.0]),
            Err(MatrixError::InvalidDim)
        );
    }

    #[test]
    fn transpose_in_place_rectangular() {
        let mut m = Matrix::from_array(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        m.transpose_in_place();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(2, 1), 6.0);
    }

    #[test]
    fn transpose_in_place_square_reuses_storage() {
        let mut m = Matrix::from_array(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        m.transpose_in_place();
        assert_eq!(m.as_slice(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn invert_identity_is_identity() {
        let id = Matrix::identity(4);
        let inv = id.invert().unwrap();
        assert_eq!(inv, id);
    }

    #[test]
    fn invert_singular_fails() {
        let m = Matrix::from_array(2, 2, &[1.0, 2.0, 2.0, 4.0]).unwrap();
        assert_eq!(m.invert(), Err(MatrixError::Singular));
    }

    #[test]
    fn determinant_of_diagonal() {
        let m = Matrix::from_array(3, 3, &[2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0]).unwrap();
        assert!((m.determinant().unwrap() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn normalise_to_unit_det_scales_correctly() {
        let mut m = Matrix::from_array(2, 2, &[2.0, 0.0, 0.0, 8.0]).unwrap();
        let d = m.normalise_to_unit_det(1e-12).unwrap();
        assert!((d - 4.0).abs() < 1e-9);
        assert!((m.determinant().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalise_to_unit_det_rescale_preserves_predicted_intensity() {
        // Folding the determinant scale `d` into `lambda` (lambda *= d
        // when the normalised factor is divided by d) must leave
        // `lambda * M * S * P` unchanged: this is the invariant the
        // MPN estimator relies on to renormalise P/M without
        // perturbing the fitted model.
        let m = Matrix::from_array(2, 2, &[1.0, 0.2, 0.1, 1.0]).unwrap();
        let s = Matrix::from_array(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
        let mut p = Matrix::from_array(3, 3, &[2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0]).unwrap();
        let lambda = 1.5_f64;

        let mut before = m.matmul(&s).unwrap().matmul(&p).unwrap();
        before.scale(lambda);

        let d = p.normalise_to_unit_det(1e-12).unwrap();
        let lambda_scaled = lambda * d;

        let mut after = m.matmul(&s).unwrap().matmul(&p).unwrap();
        after.scale(lambda_scaled);

        for (a, b) in before.as_slice().iter().zip(after.as_slice().iter()) {
            assert!((a - b).abs() < 1e-8, "predicted intensity drifted: {a} vs {b}");
        }
    }

    #[test]
    fn normalise_to_unit_det_near_singular() {
        let mut m = Matrix::from_array(2, 2, &[1e-10, 0.0, 0.0, 1e-10]).unwrap();
        assert_eq!(m.normalise_to_unit_det(1e-6), Err(MatrixError::NearSingular));
    }

    #[test]
    fn append_columns_builds_from_empty() {
        let mut dst = Matrix::new(0, 0);
        let src = Matrix::from_array(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        Matrix::append_columns(&mut dst, &src, 0, 1).unwrap();
        assert_eq!(dst.rows(), 2);
        assert_eq!(dst.cols(), 2);
        assert_eq!(dst.get(0, 1), 2.0);
        Matrix::append_columns(&mut dst, &src, 2, 2).unwrap();
        assert_eq!(dst.cols(), 3);
        assert_eq!(dst.get(1, 2), 6.0);
    }

    #[test]
    fn block_diagonal_extracts_blocks() {
        // Two 2x2 blocks on the diagonal of a 4x4 matrix.
        let mut m = Matrix::new(4, 4);
        m[(0, 0)] = 1.0;
        m[(0, 1)] = 2.0;
        m[(1, 0)] = 3.0;
        m[(1, 1)] = 4.0;
        m[(2, 2)] = 5.0;
        m[(2, 3)] = 6.0;
        m[(3, 2)] = 7.0;
        m[(3, 3)] = 8.0;
        let blocks = m.block_diagonal(2).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(blocks[1].as_slice(), &[5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn x_m_y_bilinear_form() {
        let m = Matrix::identity(3);
        let x = [1.0, 2.0, 3.0];
        let y = [1.0, 1.0, 1.0];
        assert_eq!(Matrix::x_m_y(&x, &m, &y).unwrap(), 6.0);
    }
}
