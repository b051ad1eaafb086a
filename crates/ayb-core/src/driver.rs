//! C8: the AYB driver loop, orchestrating one sub-tile from seed
//! matrices through `NIter` estimate/re-call rounds to final calls.

use crate::config::Config;
use crate::error::{AybError, Result};
use crate::state::{crosstalk_prior, AybState};
use ayb_estimate::{cluster_weights, mpn_estimate, ClusterData, EstimateOutcome};
use ayb_model::{call_base, call_base_simple, estimate_covariance, estimate_lambda_ols, estimate_lambda_wls, process, NBASE};
use ayb_matrix::{Matrix, MatrixError};
use ayb_tile::{parse_blockspec, split_tile, Tile};

/// `spec.md` §7: a singular or near-singular `M`/`P` is a per-sub-tile
/// `ESTIMATE_NONCONVERGENT`, not a fatal error for the whole run — only
/// genuine programmer errors (mismatched dimensions) should escape as
/// `AybError::Matrix`.
fn invert_or_nonconvergent(matrix: &Matrix) -> Result<Matrix> {
    match matrix.invert() {
        Ok(inv) => Ok(inv),
        Err(MatrixError::Singular | MatrixError::NearSingular) => Err(AybError::EstimateNonconvergent),
        Err(other) => Err(AybError::Matrix(other)),
    }
}

/// Outcome of processing one sub-tile: either the finished state, or a
/// non-fatal failure (`spec.md` §7: sub-tile failures are isolated).
#[derive(Debug)]
pub enum SubtileOutcome {
    Done(AybState),
    Failed(AybError),
}

/// Splits `raw` per `blockspec` and runs the driver on every resulting
/// sub-tile. `InsufficientCycles`, `BadBlockspec` and `MatrixDimMismatch`
/// abort the whole run; `EstimateNonconvergent` and `OutOfMemory` are
/// isolated to the sub-tile that hit them.
pub fn run(raw: &Tile, blockspec: &str, config: &Config) -> Result<Vec<SubtileOutcome>> {
    config.validate()?;
    let blocks = parse_blockspec(blockspec)?;
    let spec_total: u64 = blocks.iter().map(|b| b.num as u64).sum();
    let k_total = raw.ncycle().unwrap_or(0) as u64;
    if spec_total > k_total {
        return Err(AybError::InsufficientCycles);
    }
    let subtiles = split_tile(raw, &blocks)?;

    let mut outcomes = Vec::with_capacity(subtiles.len());
    for subtile in subtiles {
        match run_subtile(subtile, config) {
            Ok(state) => outcomes.push(SubtileOutcome::Done(state)),
            Err(err @ (AybError::EstimateNonconvergent | AybError::OutOfMemory)) => {
                tracing::warn!(?err, "sub-tile abandoned");
                outcomes.push(SubtileOutcome::Failed(err));
            }
            Err(fatal) => return Err(fatal),
        }
    }
    Ok(outcomes)
}

/// Runs the full driver loop (`spec.md` §4.8) on a single already-split
/// sub-tile.
pub fn run_subtile(tile: Tile, config: &Config) -> Result<AybState> {
    let ncluster = tile.ncluster();
    let ncycle = tile.ncycle().unwrap_or(0);

    if ncluster.saturating_mul(ncycle) > config.max_cells {
        return Err(AybError::OutOfMemory);
    }

    let m = seed_or_default(&config.seed_crosstalk, NBASE, NBASE, crosstalk_prior)?;
    let n = seed_or_default(&config.seed_noise, NBASE, ncycle, || Matrix::new(NBASE, ncycle))?;
    let p = seed_or_default(&config.seed_phasing, ncycle, ncycle, || Matrix::identity(ncycle))?;

    let mut state = AybState::new(tile, m, p, n);

    initial_calls(&mut state)?;

    for iter in 0..config.n_iter {
        let clusters: Vec<ClusterData> = state
            .tile
            .clusters
            .iter()
            .zip(state.bases.iter())
            .map(|(c, b)| ClusterData { signals: &c.signals, bases: b })
            .collect();

        match mpn_estimate(&mut state.m, &mut state.p, &mut state.n, &mut state.lambda, &clusters) {
            EstimateOutcome::Converged(sum_lss) => {
                tracing::debug!(iter, sum_lss, "mpn_estimate step");
            }
            EstimateOutcome::NonConvergent => return Err(AybError::EstimateNonconvergent),
        }

        let (weights, _) = cluster_weights(&state.m, &state.p, &state.n, &state.lambda, &clusters);
        state.weight = weights;

        let m_inv_t = invert_or_nonconvergent(&state.m)?.transposed();
        let p_inv_t = invert_or_nonconvergent(&state.p)?.transposed();

        let mut processed_for_cov: Vec<Matrix> = Vec::with_capacity(ncluster);
        for c in &state.tile.clusters {
            processed_for_cov.push(process(&c.signals, &m_inv_t, &p_inv_t, &state.n)?);
        }
        let cov = estimate_covariance(&mut processed_for_cov, &state.lambda, &state.weight, &state.bases, ncycle)?;
        state.cycle_var = cov.cycle_var;

        for i in 0..ncluster {
            let processed = process(&state.tile.clusters[i].signals, &m_inv_t, &p_inv_t, &state.n)?;
            state.lambda[i] = estimate_lambda_wls(&processed, &state.bases[i], state.lambda[i], &state.cycle_var);

            for k in 0..ncycle {
                let mut pcol = [0.0_f64; NBASE];
                for b in 0..NBASE {
                    pcol[b] = processed.get(b, k);
                }
                let call = call_base(&pcol, state.lambda[i], &cov.omega[k], config.mu, None);
                state.bases[i][k] = call.base;
                state.quals[i][k] = call.quality;
            }

            state.lambda[i] = estimate_lambda_wls(&processed, &state.bases[i], state.lambda[i], &state.cycle_var);
        }

        tracing::info!(
            iter,
            ncluster,
            ncycle,
            mean_quality = mean_quality(&state.quals),
            "sub-tile iteration complete"
        );
    }

    Ok(state)
}

fn initial_calls(state: &mut AybState) -> Result<()> {
    let ncluster = state.ncluster;
    let ncycle = state.ncycle;
    let m_inv_t = invert_or_nonconvergent(&state.m)?.transposed();
    let p_inv_t = invert_or_nonconvergent(&state.p)?.transposed();

    for i in 0..ncluster {
        let processed = process(&state.tile.clusters[i].signals, &m_inv_t, &p_inv_t, &state.n)?;
        for k in 0..ncycle {
            let mut pcol = [0.0_f64; NBASE];
            for b in 0..NBASE {
                pcol[b] = processed.get(b, k);
            }
            state.bases[i][k] = call_base_simple(&pcol);
            state.quals[i][k] = ayb_model::MIN_QUALITY;
        }
        state.lambda[i] = estimate_lambda_ols(&processed, &state.bases[i]);
    }
    Ok(())
}

fn seed_or_default(seed: &Option<Matrix>, rows: usize, cols: usize, default: impl FnOnce() -> Matrix) -> Result<Matrix> {
    match seed {
        Some(s) => {
            if s.rows() != rows || s.cols() != cols {
                return Err(AybError::MatrixDimMismatch);
            }
            Ok(s.clone())
        }
        None => Ok(default()),
    }
}

fn mean_quality(quals: &[Vec<u8>]) -> f64 {
    let total: u64 = quals.iter().flatten().map(|&q| q as u64).sum();
    let count: usize = quals.iter().map(|v| v.len()).sum();
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}
