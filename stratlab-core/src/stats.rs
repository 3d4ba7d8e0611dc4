//! Statistical primitives implemented from first principles.
//!
//! - Sample moments (mean, standard deviation, skewness, excess kurtosis)
//! - Linear-interpolated percentiles and Pearson correlation
//! - Standard normal CDF and its inverse (Acklam's rational approximation)
//! - Lanczos ln(Gamma), regularized incomplete beta, Student's t CDF
//! - One-sided t-test (H0: mean = 0, H1: mean > 0)
//!
//! Every helper returns a neutral value for degenerate input instead of NaN.

use serde::{Deserialize, Serialize};

/// Threshold below which a standard deviation is treated as zero.
pub const ZERO_VARIANCE_EPS: f64 = 1e-15;

// ─── Moments ─────────────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator). 0.0 below two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Skewness (third standardized moment, population form over sample std).
pub fn skewness(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(values);
    let s = std_dev(values);
    if s < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    values.iter().map(|v| ((v - m) / s).powi(3)).sum::<f64>() / n as f64
}

/// Excess kurtosis (fourth standardized moment minus 3).
pub fn excess_kurtosis(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 4 {
        return 0.0;
    }
    let m = mean(values);
    let s = std_dev(values);
    if s < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    values.iter().map(|v| ((v - m) / s).powi(4)).sum::<f64>() / n as f64 - 3.0
}

// ─── Order statistics ────────────────────────────────────────────────

/// Percentile (0-100) of an ascending-sorted slice, linear interpolation.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Percentile (0-100) of an unsorted slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    percentile_sorted(&sorted_copy(values), p)
}

/// Ascending copy; NaN compares equal so it never panics.
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

/// Pearson correlation over the common prefix of `a` and `b`.
///
/// Returns 0.0 when either side has zero variance or fewer than 2 points.
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    let denom = (va * vb).sqrt();
    if denom < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

// ─── Normal distribution ─────────────────────────────────────────────

/// Complementary error function (Chebyshev fit, fractional error < 1.2e-7).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal CDF Φ(z).
pub fn normal_cdf(z: f64) -> f64 {
    if z.is_nan() {
        return 0.0;
    }
    (0.5 * erfc(-z / std::f64::consts::SQRT_2)).clamp(0.0, 1.0)
}

/// Inverse standard normal CDF Φ⁻¹(p) (Acklam, relative error < 1.2e-9).
///
/// Returns ±infinity at the closed ends and NaN outside [0, 1].
pub fn inverse_normal_cdf(p: f64) -> f64 {
    #[allow(clippy::excessive_precision)]
    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    #[allow(clippy::excessive_precision)]
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    #[allow(clippy::excessive_precision)]
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    #[allow(clippy::excessive_precision)]
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];
    const P_LOW: f64 = 0.02425;

    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

// ─── Student's t ─────────────────────────────────────────────────────

/// Lanczos approximation for ln(Gamma(x)), g=7, n=9.
fn ln_gamma(x: f64) -> f64 {
    #[allow(clippy::excessive_precision)]
    const COEFFICIENTS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    const G: f64 = 7.0;

    if x < 0.5 {
        // Reflection: Gamma(x) * Gamma(1-x) = pi / sin(pi*x)
        let sin_val = (std::f64::consts::PI * x).sin();
        if sin_val.abs() < 1e-300 {
            return f64::INFINITY;
        }
        return std::f64::consts::PI.ln() - sin_val.abs().ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = COEFFICIENTS[0];
    for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + G + 0.5;
    let log_sqrt_2pi = (2.0 * std::f64::consts::PI).sqrt().ln();
    log_sqrt_2pi + (t.ln() * (x + 0.5)) - t + sum.ln()
}

/// Regularized incomplete beta I_x(a, b), modified Lentz continued fraction.
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x == 1.0 {
        return 1.0;
    }
    if x > (a + 1.0) / (a + b + 2.0) {
        return 1.0 - regularized_incomplete_beta(b, a, 1.0 - x);
    }

    let ln_prefix =
        a * x.ln() + b * (1.0 - x).ln() - ln_gamma(a) - ln_gamma(b) + ln_gamma(a + b) - a.ln();
    let prefix = ln_prefix.exp();

    const MAX_ITER: usize = 200;
    const EPSILON: f64 = 1e-14;
    const TINY: f64 = 1e-30;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let mut c = 1.0_f64;
    let mut d = 1.0 / guard(1.0 - (a + b) * x / (a + 1.0));
    let mut f = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;

        let even = m * (b - m) * x / ((a + 2.0 * m - 1.0) * (a + 2.0 * m));
        d = 1.0 / guard(1.0 + even * d);
        c = guard(1.0 + even / c);
        f *= c * d;

        let odd = -((a + m) * (a + b + m) * x) / ((a + 2.0 * m) * (a + 2.0 * m + 1.0));
        d = 1.0 / guard(1.0 + odd * d);
        c = guard(1.0 + odd / c);
        let delta = c * d;
        f *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }

    prefix * f
}

/// Student's t CDF: P(T <= t) with `df` degrees of freedom.
pub fn t_cdf(t: f64, df: f64) -> f64 {
    if df <= 0.0 {
        return f64::NAN;
    }
    if t == 0.0 {
        return 0.5;
    }
    let x = df / (df + t * t);
    let ib = regularized_incomplete_beta(df / 2.0, 0.5, x);
    if t > 0.0 {
        1.0 - 0.5 * ib
    } else {
        0.5 * ib
    }
}

/// Result of a one-sided t-test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    /// mean / (std / sqrt(n))
    pub t_statistic: f64,
    /// P(T > t) under H0.
    pub p_value: f64,
    /// n - 1
    pub df: f64,
}

/// One-sided t-test, H0: mean = 0, H1: mean > 0. None below two values.
pub fn one_sided_t_test(values: &[f64]) -> Option<TTestResult> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let m = mean(values);
    let std_err = std_dev(values) / n_f.sqrt();
    let df = n_f - 1.0;

    if std_err < ZERO_VARIANCE_EPS {
        // Identical values: t is undefined, report the limit.
        let (t_statistic, p_value) = if m > 0.0 {
            (f64::INFINITY, 0.0)
        } else {
            (0.0, 0.5)
        };
        return Some(TTestResult {
            t_statistic,
            p_value,
            df,
        });
    }

    let t_statistic = m / std_err;
    Some(TTestResult {
        t_statistic,
        p_value: 1.0 - t_cdf(t_statistic, df),
        df,
    })
}
