//! C5: the MPN (crosstalk/phasing/noise) estimator.
//!
//! One call to [`mpn_estimate`] performs one "parameter estimation
//! loop" from `spec.md` §4.5: compute robustness weights, then
//! alternately re-fit `(P, N)` with `M` fixed and `(M, N)` with `P`
//! fixed, renormalising each to unit determinant and folding the
//! renormalisation into the per-cluster brightnesses.
//!
//! # Departure from the literal Kronecker-accumulator description
//!
//! `spec.md` builds one big `(K+B)K x (K+B)K` system per half-step
//! from cached sufficient statistics `J`, `K_mat`, `S̄` that get
//! incrementally rescaled around each determinant normalisation. That
//! machinery exists in the original design purely to avoid a second
//! pass over the clusters after every normalisation — a performance
//! optimisation, not a correctness requirement, since none of `J`,
//! `K_mat`, `S̄` depend on the current `M`/`P` being solved for.
//!
//! This implementation instead observes that the least-squares
//! objective `Σ w_i ||I_i − λ_i M S_i P − N||_F^2` *decouples column by
//! column* when solving for `(P, N)` with `M` fixed (column `c` of the
//! residual only involves column `c` of `P` and `N`), and *row by row*
//! when solving for `(M, N)` with `P` fixed. So each half-step reduces
//! to one shared `(K+B) x (K+B)` (respectively `(B+K) x (B+K)`) normal
//! -equations system solved once via SVD, with one column of the
//! right-hand side per output column/row — mathematically identical to
//! the spec's big block system (it *is* that system, block-diagonal in
//! the decoupled basis) but far simpler to get right without being
//! able to run the code. See `DESIGN.md`.

use ayb_matrix::{svd_solve, Matrix, MatrixError};
use ayb_model::Nuc;
use ayb_stats::{cauchy, mean, variance};

/// Inner alternating-solve iteration count. Distinct from the outer
/// `NIter` base-calling loop in `ayb-core`'s `Config`: this is a fixed
/// implementation constant local to one `mpn_estimate` call.
const INNER_ITER: usize = 20;

/// `normalise_to_unit_det`'s own tolerance is the sole ill-conditioning
/// gate for a half-step: a rank-deficient normal-equations system (e.g.
/// fewer clusters than unknowns) is not itself a failure, since the
/// underlying SVD solve already falls back to the minimum-norm
/// least-squares solution in that case. What genuinely signals trouble
/// is the *extracted* `P` or `M` coming out near-singular.
const NEAR_SINGULAR_EPS: f64 = 3e-8;

/// Outcome of one [`mpn_estimate`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimateOutcome {
    /// The alternating solve made progress; carries the new weighted
    /// sum of squared residuals (`spec.md`'s `sumLSS - ΔLSE`).
    Converged(f64),
    /// Both halves of some inner iteration failed; the sub-tile this
    /// call was working on should be abandoned.
    NonConvergent,
}

/// Per-cluster data the estimator needs: the raw intensities and the
/// currently-called bases. Brightness lives in the parallel `lambdas`
/// slice passed to [`mpn_estimate`] since it is mutated in place.
pub struct ClusterData<'a> {
    pub signals: &'a Matrix,
    pub bases: &'a [Nuc],
}

/// Runs one MPN parameter-estimation loop, updating `m`, `p`, `n` and
/// `lambdas` in place.
pub fn mpn_estimate(
    m: &mut Matrix,
    p: &mut Matrix,
    n: &mut Matrix,
    lambdas: &mut [f64],
    clusters: &[ClusterData],
) -> EstimateOutcome {
    let nbase = m.rows();
    let ncycle = p.rows();
    let nclust = clusters.len();

    let indicators: Vec<Matrix> = clusters
        .iter()
        .map(|c| indicator_matrix(c.bases, nbase, ncycle))
        .collect();

    let (weights, sum_lss) = compute_weights(m, p, n, lambdas, clusters, &indicators);

    let mut lambda_factor = 1.0_f64;
    let mut nonconvergent = false;

    for _ in 0..INNER_ITER {
        let pn_ok = pn_step(m, p, n, lambdas, &indicators, clusters, &weights);
        let mn_ok = mn_step(m, p, n, lambdas, &indicators, clusters, &weights);
        match (pn_ok, mn_ok) {
            (None, None) => {
                nonconvergent = true;
                break;
            }
            (d_p, d_m) => {
                lambda_factor *= d_p.unwrap_or(1.0) * d_m.unwrap_or(1.0);
            }
        }
    }

    if nonconvergent {
        return EstimateOutcome::NonConvergent;
    }

    for lambda in lambdas.iter_mut() {
        *lambda *= lambda_factor;
    }

    let sum_lss_after = total_weighted_lss(m, p, n, lambdas, clusters, &indicators, &weights);
    tracing::debug!(sum_lss, sum_lss_after, nclust, ncycle, "mpn_estimate converged");
    EstimateOutcome::Converged(sum_lss_after)
}

fn indicator_matrix(bases: &[Nuc], nbase: usize, ncycle: usize) -> Matrix {
    let mut s = Matrix::new(nbase, ncycle);
    for (k, base) in bases.iter().enumerate() {
        if let Some(b) = base.channel() {
            s.set(b, k, 1.0);
        }
    }
    s
}

fn predicted(m: &Matrix, s: &Matrix, p: &Matrix, n: &Matrix, lambda: f64) -> Result<Matrix, MatrixError> {
    let mut e = m.matmul(s)?.matmul(p)?;
    e.scale(lambda);
    e.add_assign(n)?;
    Ok(e)
}

fn frobenius_sq_diff(a: &Matrix, b: &Matrix) -> f64 {
    a.as_slice()
        .iter()
        .zip(b.as_slice().iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum()
}

/// Computes the same robustness weights and `sumLSS` [`mpn_estimate`]
/// uses internally, from a (typically post-fit) `(M, P, N, λ)`. Lets
/// callers (the C8 driver's covariance step) reuse the exact weighting
/// the estimator settled on without duplicating the formula.
pub fn cluster_weights(
    m: &Matrix,
    p: &Matrix,
    n: &Matrix,
    lambdas: &[f64],
    clusters: &[ClusterData],
) -> (Vec<f64>, f64) {
    let nbase = m.rows();
    let ncycle = p.rows();
    let indicators: Vec<Matrix> = clusters
        .iter()
        .map(|c| indicator_matrix(c.bases, nbase, ncycle))
        .collect();
    compute_weights(m, p, n, lambdas, clusters, &indicators)
}

fn compute_weights(
    m: &Matrix,
    p: &Matrix,
    n: &Matrix,
    lambdas: &[f64],
    clusters: &[ClusterData],
    indicators: &[Matrix],
) -> (Vec<f64>, f64) {
    let lss: Vec<f64> = clusters
        .iter()
        .zip(indicators.iter())
        .zip(lambdas.iter())
        .map(|((c, s), &lambda)| {
            let e = predicted(m, s, p, n, lambda).unwrap_or_else(|_| Matrix::new(m.rows(), p.cols()));
            frobenius_sq_diff(c.signals, &e)
        })
        .collect();

    let sum_lss: f64 = lss.iter().sum();
    let mean_lss = mean(&lss);
    let var_lss = variance(&lss);
    let weights: Vec<f64> = lss
        .iter()
        .map(|l| {
            let delta = l - mean_lss;
            cauchy(delta * delta, var_lss)
        })
        .collect();
    (weights, sum_lss)
}

fn total_weighted_lss(
    m: &Matrix,
    p: &Matrix,
    n: &Matrix,
    lambdas: &[f64],
    clusters: &[ClusterData],
    indicators: &[Matrix],
    weights: &[f64],
) -> f64 {
    clusters
        .iter()
        .zip(indicators.iter())
        .zip(lambdas.iter())
        .zip(weights.iter())
        .map(|(((c, s), &lambda), &w)| {
            let e = predicted(m, s, p, n, lambda).unwrap_or_else(|_| Matrix::new(m.rows(), p.cols()));
            w * frobenius_sq_diff(c.signals, &e)
        })
        .sum()
}

/// `(P, N)` update with `M` fixed. Returns the determinant scale
/// factor folded into `lambda_factor` by the caller on success, or
/// `None` (leaving `p`, `n` untouched) if the half-step was too
/// ill-conditioned to trust.
fn pn_step(
    m: &Matrix,
    p: &mut Matrix,
    n: &mut Matrix,
    lambdas: &[f64],
    indicators: &[Matrix],
    clusters: &[ClusterData],
    weights: &[f64],
) -> Option<f64> {
    let nbase = m.rows();
    let ncycle = p.rows();
    let dim = ncycle + nbase;
    let mut lhs = Matrix::new(dim, dim);
    let mut rhs = Matrix::new(dim, ncycle);

    for (((c, s), &lambda), &w) in clusters.iter().zip(indicators.iter()).zip(lambdas.iter()).zip(weights.iter()) {
        if w == 0.0 {
            continue;
        }
        let t = match m.matmul(s) {
            Ok(t) => t,
            Err(_) => continue,
        };
        accumulate_normal_system(&mut lhs, &mut rhs, &t, c.signals, lambda, w, ncycle, nbase, true);
    }

    svd_solve(&lhs, &mut rhs).ok()?;

    let mut new_p = Matrix::new(ncycle, ncycle);
    let mut new_n = Matrix::new(nbase, ncycle);
    for c in 0..ncycle {
        for r in 0..ncycle {
            new_p.set(r, c, rhs.get(r, c));
        }
        for r in 0..nbase {
            new_n.set(r, c, rhs.get(ncycle + r, c));
        }
    }

    let d = new_p.normalise_to_unit_det(NEAR_SINGULAR_EPS).ok()?;
    *p = new_p;
    *n = new_n;
    Some(d)
}

/// `(M, N)` update with `P` fixed. Mirror of [`pn_step`].
fn mn_step(
    m: &mut Matrix,
    p: &Matrix,
    n: &mut Matrix,
    lambdas: &[f64],
    indicators: &[Matrix],
    clusters: &[ClusterData],
    weights: &[f64],
) -> Option<f64> {
    let nbase = m.rows();
    let ncycle = p.rows();
    let dim = nbase + ncycle;
    let mut lhs = Matrix::new(dim, dim);
    let mut rhs = Matrix::new(dim, nbase);

    for (((c, s), &lambda), &w) in clusters.iter().zip(indicators.iter()).zip(lambdas.iter()).zip(weights.iter()) {
        if w == 0.0 {
            continue;
        }
        let u = match s.matmul(p) {
            Ok(u) => u,
            Err(_) => continue,
        };
        accumulate_normal_system(&mut lhs, &mut rhs, &u, c.signals, lambda, w, nbase, ncycle, false);
    }

    svd_solve(&lhs, &mut rhs).ok()?;

    let mut new_m = Matrix::new(nbase, nbase);
    let mut new_n = Matrix::new(nbase, ncycle);
    for r in 0..nbase {
        for col in 0..nbase {
            new_m.set(r, col, rhs.get(col, r));
        }
        for k in 0..ncycle {
            new_n.set(r, k, rhs.get(nbase + k, r));
        }
    }

    let d = new_m.normalise_to_unit_det(NEAR_SINGULAR_EPS).ok()?;
    *m = new_m;
    *n = new_n;
    Some(d)
}

/// Both half-steps reduce to the same shape of normal-equations
/// accumulation once the per-cluster "mixing" matrix (`T = M*S` for
/// the `(P,N)` step, `U = S*P` for the `(M,N)` step) is known: the
/// design matrix for one cluster is `[λ·mix, I]` and we're
/// accumulating `Σ w·Aᵀ·A` into `lhs` and `Σ w·Aᵀ·Y` into `rhs`, where
/// `Y` is the cluster's full intensity matrix (`transpose_first`
/// picks whether `Y`'s natural row/column orientation needs
/// transposing to match the `[mix | I]` layout: the `(P,N)` step
/// leaves it as-is, the `(M,N)` step works on `Yᵀ`).
#[allow(clippy::too_many_arguments)]
fn accumulate_normal_system(
    lhs: &mut Matrix,
    rhs: &mut Matrix,
    mix: &Matrix,
    y: &Matrix,
    lambda: f64,
    w: f64,
    mix_cols: usize,
    identity_dim: usize,
    transpose_first: bool,
) {
    let dim = mix_cols + identity_dim;
    // mix is (identity_dim x mix_cols): e.g. for the (P,N) step,
    // T = M*S is (nbase x ncycle) = (identity_dim x mix_cols).
    for p_idx in 0..mix_cols {
        for q_idx in 0..mix_cols {
            let mut dot = 0.0;
            for r in 0..identity_dim {
                dot += mix.get(r, p_idx) * mix.get(r, q_idx);
            }
            lhs[(p_idx, q_idx)] += w * lambda * lambda * dot;
        }
        for r in 0..identity_dim {
            lhs[(p_idx, mix_cols + r)] += w * lambda * mix.get(r, p_idx);
            lhs[(mix_cols + r, p_idx)] += w * lambda * mix.get(r, p_idx);
        }
    }
    for r in 0..identity_dim {
        lhs[(mix_cols + r, mix_cols + r)] += w;
    }

    // rhs column c = A^T * y(:,c) (or y(c,:) transposed, per orientation).
    let out_dim = if transpose_first { y.cols() } else { y.rows() };
    for out in 0..out_dim {
        for p_idx in 0..mix_cols {
            let mut dot = 0.0;
            for r in 0..identity_dim {
                let yv = if transpose_first { y.get(r, out) } else { y.get(out, r) };
                dot += mix.get(r, p_idx) * yv;
            }
            rhs[(p_idx, out)] += w * lambda * dot;
        }
        for r in 0..identity_dim {
            let yv = if transpose_first { y.get(r, out) } else { y.get(out, r) };
            rhs[(mix_cols + r, out)] += w * yv;
        }
    }
    let _ = dim;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn crosstalk_prior() -> Matrix {
        // Near-diagonal with mild bleed, determinant normalised to 1
        // the same way the driver seeds it.
        let mut m = Matrix::from_array(
            4,
            4,
            &[
                1.0, 0.1, 0.02, 0.0, 0.08, 1.0, 0.05, 0.01, 0.01, 0.06, 1.0, 0.09, 0.0, 0.02, 0.07, 1.0,
            ],
        )
        .unwrap();
        let _ = m.normalise_to_unit_det(1e-12).unwrap();
        m
    }

    #[test]
    fn recovers_known_mpn_from_synthetic_data() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let ncycle = 5;
        let nclust = 400;

        let m_true = crosstalk_prior();
        let mut p_true = Matrix::identity(ncycle);
        for k in 0..ncycle - 1 {
            p_true.set(k, k + 1, 0.1);
        }
        let _ = p_true.normalise_to_unit_det(1e-12).unwrap();
        let n_true = Matrix::new(4, ncycle);

        let mut signals = Vec::with_capacity(nclust);
        let mut bases_store: Vec<Vec<Nuc>> = Vec::with_capacity(nclust);
        let mut lambdas_true = Vec::with_capacity(nclust);

        for _ in 0..nclust {
            let bases: Vec<Nuc> = (0..ncycle)
                .map(|_| Nuc::BASES[rng.gen_range(0..4)])
                .collect();
            let lambda = rng.gen_range(0.5..1.5);
            let s = indicator_matrix(&bases, 4, ncycle);
            let mut e = predicted(&m_true, &s, &p_true, &n_true, lambda).unwrap();
            for v in e.as_mut_slice().iter_mut() {
                *v += rng.gen_range(-0.01..0.01);
            }
            signals.push(e);
            bases_store.push(bases);
            lambdas_true.push(lambda);
        }

        let mut m = Matrix::identity(4);
        let mut p = Matrix::identity(ncycle);
        let mut n = Matrix::new(4, ncycle);
        let mut lambdas = vec![1.0; nclust];

        let clusters: Vec<ClusterData> = signals
            .iter()
            .zip(bases_store.iter())
            .map(|(sig, b)| ClusterData { signals: sig, bases: b })
            .collect();

        for _ in 0..5 {
            match mpn_estimate(&mut m, &mut p, &mut n, &mut lambdas, &clusters) {
                EstimateOutcome::Converged(_) => {}
                EstimateOutcome::NonConvergent => panic!("estimator did not converge"),
            }
        }

        let norm_diff = |a: &Matrix, b: &Matrix| -> f64 {
            let num: f64 = a
                .as_slice()
                .iter()
                .zip(b.as_slice().iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f64>()
                .sqrt();
            let den: f64 = b.as_slice().iter().map(|y| y * y).sum::<f64>().sqrt();
            num / den
        };

        assert!(norm_diff(&m, &m_true) < 0.1, "M recovery off: {}", norm_diff(&m, &m_true));
        assert!(norm_diff(&p, &p_true) < 0.1, "P recovery off: {}", norm_diff(&p, &p_true));
    }

    #[test]
    fn all_ambiguous_bases_are_nonconvergent() {
        // Every cycle called Ambig means the indicator matrix S is
        // identically zero, so both T = M*S (pn_step) and U = S*P
        // (mn_step) are zero regardless of M, P: the P-block (resp.
        // M-block) of the normal-equations system is identically zero
        // and its minimum-norm solve is the zero matrix, which fails
        // `normalise_to_unit_det` deterministically every inner
        // iteration.
        let mut m = Matrix::identity(4);
        let mut p = Matrix::identity(3);
        let mut n = Matrix::new(4, 3);
        let bases = vec![Nuc::Ambig, Nuc::Ambig, Nuc::Ambig];
        let signals = Matrix::from_array(4, 3, &[1.0; 12]).unwrap();
        let mut lambdas = vec![1.0];
        let clusters = vec![ClusterData { signals: &signals, bases: &bases }];
        let outcome = mpn_estimate(&mut m, &mut p, &mut n, &mut lambdas, &clusters);
        assert_eq!(outcome, EstimateOutcome::NonConvergent);
    }
}
