//! C3: per-cluster brightness (`λ`) estimation by OLS and by weighted
//! least squares.

use crate::Nuc;
use ayb_matrix::Matrix;

/// OLS estimate of `λ` from the regression `p_{b,k} = λ · 1{bases[k]=b}`
/// over all channels and cycles. Since exactly one channel per cycle
/// has indicator `1`, this reduces to the mean of the "called channel"
/// intensities. Returns `0.0` if there are no cycles.
pub fn estimate_lambda_ols(p: &Matrix, bases: &[Nuc]) -> f64 {
    let k = bases.len();
    if k == 0 {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut count = 0usize;
    for (cycle, base) in bases.iter().enumerate() {
        if let Some(channel) = base.channel() {
            sum += p.get(channel, cycle);
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    let lambda = sum / count as f64;
    if lambda.is_finite() {
        lambda.max(0.0)
    } else {
        0.0
    }
}

/// Weighted least squares estimate, weighting each cycle by
/// `1 / cycle_var[k]`. Cycles with `cycle_var[k] <= 0` are excluded.
/// Falls back to `lambda_prev` if no cycle contributes or the result
/// is non-finite. If `bases` and `cycle_var` disagree in length, only
/// the shared prefix is used rather than panicking.
pub fn estimate_lambda_wls(p: &Matrix, bases: &[Nuc], lambda_prev: f64, cycle_var: &[f64]) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (cycle, (base, &var)) in bases.iter().zip(cycle_var.iter()).enumerate() {
        if var <= 0.0 {
            continue;
        }
        let Some(channel) = base.channel() else {
            continue;
        };
        let w = 1.0 / var;
        weighted_sum += w * p.get(channel, cycle);
        weight_total += w;
    }
    if weight_total <= 0.0 {
        return lambda_prev.max(0.0);
    }
    let lambda = weighted_sum / weight_total;
    if lambda.is_finite() {
        lambda.max(0.0)
    } else {
        lambda_prev.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ols_recovers_constant_brightness() {
        // Every called channel reads exactly 5.0.
        let p = Matrix::from_array(
            4,
            3,
            &[
                5.0, 0.0, 0.0, // A row
                0.0, 5.0, 0.0, // C row
                0.0, 0.0, 5.0, // G row
                0.0, 0.0, 0.0, // T row
            ],
        )
        .unwrap();
        let bases = [Nuc::A, Nuc::C, Nuc::G];
        assert_abs_diff_eq!(estimate_lambda_ols(&p, &bases), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn ols_zero_cycles_is_zero() {
        let p = Matrix::new(4, 0);
        assert_eq!(estimate_lambda_ols(&p, &[]), 0.0);
    }

    #[test]
    fn wls_excludes_nonpositive_variance_cycles() {
        let p = Matrix::from_array(4, 2, &[10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        let bases = [Nuc::A, Nuc::A];
        // Second cycle has zero variance -> must be excluded, leaving
        // only the first cycle's value of 10.
        let lambda = estimate_lambda_wls(&p, &bases, 0.0, &[1.0, 0.0]);
        assert_abs_diff_eq!(lambda, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn wls_falls_back_to_previous_when_all_excluded() {
        let p = Matrix::new(4, 2);
        let bases = [Nuc::A, Nuc::C];
        let lambda = estimate_lambda_wls(&p, &bases, 1.25, &[0.0, -1.0]);
        assert_eq!(lambda, 1.25);
    }
}
