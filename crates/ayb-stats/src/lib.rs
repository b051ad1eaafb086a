//! Statistics helpers shared by the weighting and quality-score paths:
//! mean/variance, the Cauchy robustness weight, simple linear
//! regression, and the Weibull distribution (pdf/cdf/quantile/fit)
//! used to characterise per-cluster residual behaviour.

/// Arithmetic mean. Returns `0.0` for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population variance (divides by `n`, not `n - 1`), matching the
/// robustness-weighting use in the MPN estimator where `xs` already is
/// the full population of per-cluster residuals for this sub-tile.
/// Returns `0.0` for fewer than two samples.
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64
}

/// Cauchy influence function `x / (x + s)`, used as the robustness
/// weight `w = cauchy(delta^2, var)`. Returns `1.0` at `x == 0`
/// (centre of the distribution) and tends to `0` as `x` grows relative
/// to `s`. `s <= 0` (degenerate/zero-variance population) is treated
/// as "no robust down-weighting": every cluster gets weight `1`.
pub fn cauchy(x: f64, s: f64) -> f64 {
    if s <= 0.0 {
        return 1.0;
    }
    if x <= 0.0 {
        return 1.0;
    }
    s / (x + s)
}

/// Ordinary least squares fit of `y = a + b*x`, returning `(a, b)`.
/// Returns `(mean(y), 0.0)` if `x` has zero variance (avoids a
/// division by zero on degenerate input).
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    assert_eq!(xs.len(), ys.len(), "linear_regression: length mismatch");
    let mx = mean(xs);
    let my = mean(ys);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
    }
    if sxx <= 0.0 {
        return (my, 0.0);
    }
    let b = sxy / sxx;
    let a = my - b * mx;
    (a, b)
}

/// Two-parameter Weibull distribution with shape `k` and scale
/// `lambda`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weibull {
    pub shape: f64,
    pub scale: f64,
}

impl Weibull {
    pub fn new(shape: f64, scale: f64) -> Self {
        Weibull { shape, scale }
    }

    /// Probability density at `x >= 0`.
    pub fn pdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        let (k, l) = (self.shape, self.scale);
        (k / l) * (x / l).powf(k - 1.0) * (-(x / l).powf(k)).exp()
    }

    /// Cumulative distribution function.
    pub fn cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        1.0 - (-(x / self.scale).powf(self.shape)).exp()
    }

    /// Quantile function (inverse CDF), `p` in `(0, 1)`.
    pub fn quantile(&self, p: f64) -> f64 {
        debug_assert!(p > 0.0 && p < 1.0);
        self.scale * (-(1.0 - p).ln()).powf(1.0 / self.shape)
    }

    /// Method-of-moments-free fit by linear regression on the
    /// log-log transform of the empirical CDF: for sorted samples
    /// `x_(i)` with plotting positions `p_i = (i - 0.5) / n`,
    /// `ln(-ln(1 - p_i)) = k * ln(x_(i)) - k * ln(lambda)` is linear in
    /// `ln(x_(i))`. Requires all samples `> 0`.
    pub fn fit(samples: &[f64]) -> Option<Weibull> {
        let mut xs: Vec<f64> = samples.iter().cloned().filter(|x| *x > 0.0).collect();
        if xs.len() < 2 {
            return None;
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = xs.len() as f64;
        let log_x: Vec<f64> = xs.iter().map(|x| x.ln()).collect();
        let log_log_inv_surv: Vec<f64> = (1..=xs.len())
            .map(|i| {
                let p = (i as f64 - 0.5) / n;
                (-(1.0 - p).ln()).ln()
            })
            .collect();
        let (a, b) = linear_regression(&log_x, &log_log_inv_surv);
        if b <= 0.0 {
            return None;
        }
        let shape = b;
        let scale = (-a / b).exp();
        Some(Weibull::new(shape, scale))
    }
}
