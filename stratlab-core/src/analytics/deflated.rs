//! Deflated Sharpe Ratio (Bailey & López de Prado).
//!
//! The probability that the true Sharpe ratio is positive after correcting
//! for the number of strategy trials tested and for non-normal returns:
//!
//! ```text
//! σ_SR  = sqrt((1 - γ₃·SR + (γ₄ - 1)/4 · SR²) / (T - 1))
//! SR₀   = σ_SR · E[max of N iid N(0,1)]
//! E[max] ≈ (1 - γ)·Φ⁻¹(1 - 1/N) + γ·Φ⁻¹(1 - 1/(N·e))
//! DSR   = Φ((SR - SR₀) / σ_SR)
//! ```
//!
//! `SR` is the per-period (non-annualized) Sharpe ratio, γ₃ the skewness,
//! γ₄ the (non-excess) kurtosis and γ the Euler–Mascheroni constant.
//! For a fixed observed Sharpe the DSR strictly decreases as N grows.

use serde::{Deserialize, Serialize};

use crate::stats::{excess_kurtosis, inverse_normal_cdf, mean, normal_cdf, skewness, std_dev};

#[allow(clippy::excessive_precision)]
pub const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_860_6;

/// Full deflated-Sharpe breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeflatedSharpe {
    /// P(true SR > 0) after deflation, in [0, 1].
    pub probability: f64,
    /// Per-period observed Sharpe.
    pub observed_sharpe: f64,
    /// SR₀: expected maximum Sharpe under the null across `n_trials`.
    pub benchmark_sharpe: f64,
    /// Standard error of the Sharpe estimate.
    pub sharpe_std_error: f64,
    pub n_trials: usize,
    pub n_obs: usize,
}

impl DeflatedSharpe {
    fn neutral(observed_sharpe: f64, n_trials: usize, n_obs: usize) -> Self {
        Self {
            probability: 0.0,
            observed_sharpe,
            benchmark_sharpe: 0.0,
            sharpe_std_error: 0.0,
            n_trials,
            n_obs,
        }
    }
}

/// Expected maximum of `n_trials` iid standard normals. 0.0 for one trial.
pub fn expected_max_sharpe(n_trials: usize) -> f64 {
    if n_trials <= 1 {
        return 0.0;
    }
    let n = n_trials as f64;
    (1.0 - EULER_MASCHERONI) * inverse_normal_cdf(1.0 - 1.0 / n)
        + EULER_MASCHERONI * inverse_normal_cdf(1.0 - 1.0 / (n * std::f64::consts::E))
}

/// Deflated Sharpe probability from summary inputs.
///
/// Returns 0.0 for zero trials, fewer than two observations, or a
/// non-positive variance term.
pub fn deflated_sharpe_ratio(
    observed_sharpe: f64,
    n_trials: usize,
    n_obs: usize,
    skew: f64,
    excess_kurt: f64,
) -> f64 {
    deflate(observed_sharpe, n_trials, n_obs, skew, excess_kurt).probability
}

/// Deflated Sharpe computed directly from a per-period return series.
pub fn deflated_sharpe_from_returns(returns: &[f64], n_trials: usize) -> DeflatedSharpe {
    let std = std_dev(returns);
    let observed = if std > 0.0 { mean(returns) / std } else { 0.0 };
    deflate(
        observed,
        n_trials,
        returns.len(),
        skewness(returns),
        excess_kurtosis(returns),
    )
}

fn deflate(
    observed_sharpe: f64,
    n_trials: usize,
    n_obs: usize,
    skew: f64,
    excess_kurt: f64,
) -> DeflatedSharpe {
    if n_trials == 0 || n_obs < 2 || !observed_sharpe.is_finite() {
        return DeflatedSharpe::neutral(0.0, n_trials, n_obs);
    }
    let sr = observed_sharpe;
    let kurtosis = excess_kurt + 3.0;
    let variance_term = 1.0 - skew * sr + (kurtosis - 1.0) / 4.0 * sr * sr;
    if variance_term <= 0.0 || !variance_term.is_finite() {
        return DeflatedSharpe::neutral(sr, n_trials, n_obs);
    }
    let sharpe_std_error = (variance_term / (n_obs as f64 - 1.0)).sqrt();
    let benchmark_sharpe = sharpe_std_error * expected_max_sharpe(n_trials);
    let probability = normal_cdf((sr - benchmark_sharpe) / sharpe_std_error);

    DeflatedSharpe {
        probability,
        observed_sharpe: sr,
        benchmark_sharpe,
        sharpe_std_error,
        n_trials,
        n_obs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_max_grows_with_trials() {
        assert_eq!(expected_max_sharpe(1), 0.0);
        let mut prev = expected_max_sharpe(2);
        assert!(prev > 0.0);
        for n in [3, 5, 10, 100, 1_000, 10_000] {
            let e = expected_max_sharpe(n);
            assert!(e > prev, "E[max] not increasing at N={n}");
            prev = e;
        }
    }

    #[test]
    fn expected_max_of_hundred_is_about_two_and_a_half() {
        let e = expected_max_sharpe(100);
        assert!((2.4..2.6).contains(&e), "got {e}");
    }

    #[test]
    fn more_trials_deflate_more() {
        let one = deflated_sharpe_ratio(0.1, 1, 252, 0.0, 0.0);
        let hundred = deflated_sharpe_ratio(0.1, 100, 252, 0.0, 0.0);
        assert!(one > hundred, "DSR(1)={one} DSR(100)={hundred}");
        assert!(one > 0.9);
        assert!(hundred < 0.5);
    }

    #[test]
    fn negative_skew_fat_tails_lower_dsr() {
        let normal = deflated_sharpe_ratio(0.1, 10, 252, 0.0, 0.0);
        let ugly = deflated_sharpe_ratio(0.1, 10, 252, -2.0, 10.0);
        assert!(ugly < normal);
    }

    #[test]
    fn degenerate_inputs_are_zero() {
        assert_eq!(deflated_sharpe_ratio(0.1, 0, 252, 0.0, 0.0), 0.0);
        assert_eq!(deflated_sharpe_ratio(0.1, 5, 1, 0.0, 0.0), 0.0);
        assert_eq!(deflated_sharpe_ratio(f64::NAN, 5, 100, 0.0, 0.0), 0.0);
        assert_eq!(deflated_sharpe_from_returns(&[], 10).probability, 0.0);
    }

    #[test]
    fn from_returns_matches_summary_path() {
        let r: Vec<f64> = (0..120)
            .map(|i| if i % 3 == 0 { -0.004 } else { 0.006 })
            .collect();
        let d = deflated_sharpe_from_returns(&r, 20);
        let direct = deflated_sharpe_ratio(
            d.observed_sharpe,
            20,
            r.len(),
            skewness(&r),
            excess_kurtosis(&r),
        );
        assert!((d.probability - direct).abs() < 1e-15);
        assert!(d.benchmark_sharpe > 0.0);
    }
}
