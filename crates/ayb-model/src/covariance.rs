//! C6: per-cycle residual covariance estimation.

use crate::Nuc;
use ayb_matrix::{invert_via_cholesky, Matrix, Result};

/// Result of [`estimate_covariance`]: per-cycle residual variance
/// (the trace of the per-cycle covariance) and its inverse `Ω`.
pub struct CovarianceResult {
    pub cycle_var: Vec<f64>,
    pub omega: Vec<Matrix>,
}

/// One forward sweep over clusters accumulating, per cycle `k`,
/// `V_k += w_i * R_{i,k} R_{i,k}^T` where `R_{i,k} = P_{i,k} - λ_i e_b`
/// for the cluster's called base `b`. `V_k` is then divided by the
/// total weight and inverted to produce `Ω_k`.
///
/// **This consumes `processed`**: on return, every cluster's processed
/// intensity matrix has been overwritten column-by-column with the
/// residual `R_{i,k}`, matching the deliberate micro-optimisation in
/// the original design (`spec.md` §4.6) — callers must not reuse
/// `processed` afterwards for anything but reading residuals.
pub fn estimate_covariance(
    processed: &mut [Matrix],
    lambdas: &[f64],
    weights: &[f64],
    bases: &[Vec<Nuc>],
    ncycle: usize,
) -> Result<CovarianceResult> {
    let nbase = crate::NBASE;
    let mut v = vec![Matrix::new(nbase, nbase); ncycle];
    let mut weight_total = vec![0.0_f64; ncycle];

    for i in 0..processed.len() {
        let lambda = lambdas[i];
        let w = weights[i];
        for k in 0..ncycle {
            let Some(channel) = bases[i][k].channel() else {
                continue;
            };
            let mut r = [0.0_f64; 4];
            for b in 0..nbase {
                r[b] = processed[i].get(b, k);
            }
            r[channel] -= lambda;
            for b in 0..nbase {
                processed[i].set(b, k, r[b]);
            }
            if w == 0.0 {
                continue;
            }
            for a in 0..nbase {
                for b in 0..nbase {
                    let add = w * r[a] * r[b];
                    v[k][(a, b)] += add;
                }
            }
            weight_total[k] += w;
        }
    }

    let mut cycle_var = vec![0.0; ncycle];
    let mut omega = Vec::with_capacity(ncycle);
    for k in 0..ncycle {
        if weight_total[k] > 0.0 {
            v[k].scale(1.0 / weight_total[k]);
        }
        let trace: f64 = (0..nbase).map(|b| v[k].get(b, b)).sum();
        cycle_var[k] = trace;
        omega.push(invert_via_cholesky(&v[k]).or_else(|_| v[k].invert())?);
    }

    Ok(CovarianceResult { cycle_var, omega })
}
