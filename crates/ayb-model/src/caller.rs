//! C4: per-cycle base calling from processed intensities.

use crate::{clamp_quality, Nuc, NBASE};
use ayb_matrix::Matrix;

/// One cycle's call: the chosen base and its Phred-like quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseCall {
    pub base: Nuc,
    pub quality: u8,
}

/// Minimum-LS base call with posterior-probability quality.
///
/// `p` is the processed intensity for one cycle (`NBASE` values),
/// `lambda` the cluster's current brightness, `omega` the `NBASE x
/// NBASE` inverse residual covariance for this cycle, and `penalty` an
/// optional per-base additive penalty (e.g. from phasing lookahead);
/// `None` is equivalent to an all-zero penalty.
pub fn call_base(p: &[f64; NBASE], lambda: f64, omega: &Matrix, mu: f64, penalty: Option<&[f64; NBASE]>) -> BaseCall {
    if lambda == 0.0 {
        return BaseCall {
            base: Nuc::A,
            quality: crate::MIN_QUALITY,
        };
    }
    let zero_penalty = [0.0; NBASE];
    let penalty = penalty.unwrap_or(&zero_penalty);

    let mut stat = [0.0_f64; NBASE];
    for b in 0..NBASE {
        let mut cross = 0.0;
        for j in 0..NBASE {
            cross += p[j] * omega.get(b, j);
        }
        stat[b] = lambda * lambda * omega.get(b, b) - 2.0 * lambda * cross + penalty[b];
    }

    // argmin with first-found tie-break (natural order A<C<G<T).
    let mut call = 0usize;
    let mut min = stat[0];
    for b in 1..NBASE {
        if stat[b] < min {
            min = stat[b];
            call = b;
        }
    }

    let tot: f64 = stat.iter().map(|s| (-0.5 * (s - min)).exp()).sum();
    let k = bilinear(p, omega);
    let max_prob = (-0.5 * (k + min)).exp();

    let post = if max_prob < mu {
        let e = (-0.5 * penalty[call]).exp();
        (e * mu + max_prob) / (4.0 * mu + max_prob * tot)
    } else {
        let e = (-0.5 * penalty[call]).exp();
        (e * mu / max_prob + 1.0) / (4.0 * mu / max_prob + tot)
    };

    BaseCall {
        base: Nuc::from_channel(call),
        quality: quality_from_prob(post),
    }
}

fn bilinear(p: &[f64; NBASE], omega: &Matrix) -> f64 {
    let mut acc = 0.0;
    for i in 0..NBASE {
        let mut row = 0.0;
        for j in 0..NBASE {
            row += omega.get(i, j) * p[j];
        }
        acc += p[i] * row;
    }
    acc
}

/// Maps a posterior probability `post` in `[0, 1)` onto
/// `[MIN_QUALITY, MAX_QUALITY]` via the Phred relationship
/// `q = round(-10 * log10(1 - post))`.
pub fn quality_from_prob(post: f64) -> u8 {
    if !post.is_finite() || post <= 0.0 {
        return crate::MIN_QUALITY;
    }
    let error_prob = (1.0 - post).max(1e-10);
    let q = (-10.0 * error_prob.log10()).round() as i64;
    clamp_quality(q)
}

/// Simple `argmax(p)` caller used for the initial call before any
/// model fit. Returns `Ambig` if `p` is all-equal or contains any
/// non-finite value.
pub fn call_base_simple(p: &[f64; NBASE]) -> Nuc {
    if p.iter().any(|v| !v.is_finite()) {
        return Nuc::Ambig;
    }
    let first = p[0];
    if p.iter().all(|v| *v == first) {
        return Nuc::Ambig;
    }
    let mut best = 0usize;
    for b in 1..NBASE {
        if p[b] > p[best] {
            best = b;
        }
    }
    Nuc::from_channel(best)
}
