//! Distribution-shape statistics — CVaR, skewness, kurtosis, downside ratio.
//!
//! These feed the deflated Sharpe ratio and the tearsheet distribution
//! section. All values fall back to 0.0 on degenerate input.

use serde::{Deserialize, Serialize};

use crate::stats::{excess_kurtosis, mean, skewness, sorted_copy, std_dev, ZERO_VARIANCE_EPS};

/// Below this many observations the shape estimates are flagged unreliable.
pub const MIN_RELIABLE_OBSERVATIONS: usize = 30;

/// Tail risk statistics of a return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailMetrics {
    /// Mean of the worst 5% of periods (negative for losses).
    pub cvar_95: f64,
    pub skewness: f64,
    /// Fourth standardized moment minus 3.
    pub excess_kurtosis: f64,
    /// downside_std / total_std; values > 1 mean asymmetric downside.
    pub downside_deviation_ratio: f64,
    pub sample_size: usize,
    /// False when `sample_size < MIN_RELIABLE_OBSERVATIONS`.
    pub reliable: bool,
}

pub fn compute_tail_metrics(returns: &[f64]) -> TailMetrics {
    let n = returns.len();
    TailMetrics {
        cvar_95: cvar_95(returns),
        skewness: skewness(returns),
        excess_kurtosis: excess_kurtosis(returns),
        downside_deviation_ratio: downside_deviation_ratio(returns),
        sample_size: n,
        reliable: n >= MIN_RELIABLE_OBSERVATIONS,
    }
}

/// Average of the worst 5% of returns (at least one observation).
fn cvar_95(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sorted = sorted_copy(returns);
    let cutoff = ((sorted.len() as f64 * 0.05).ceil() as usize).max(1);
    mean(&sorted[..cutoff])
}

fn downside_deviation_ratio(returns: &[f64]) -> f64 {
    let total_std = std_dev(returns);
    if total_std < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    (downside_sq / returns.len() as f64).sqrt() / total_std
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_neutral() {
        let t = compute_tail_metrics(&[]);
        assert_eq!(t.cvar_95, 0.0);
        assert_eq!(t.skewness, 0.0);
        assert_eq!(t.sample_size, 0);
        assert!(!t.reliable);
    }

    #[test]
    fn cvar_is_mean_of_worst_tail() {
        // 100 returns from -0.05 to +0.049: worst 5 are -0.05..-0.046
        let r: Vec<f64> = (0..100).map(|i| (i as f64 - 50.0) / 1000.0).collect();
        let t = compute_tail_metrics(&r);
        assert!((t.cvar_95 - (-0.048)).abs() < 1e-12);
        assert!(t.reliable);
    }

    #[test]
    fn left_skew_detected() {
        let mut r = vec![0.01; 60];
        r.push(-0.3);
        let t = compute_tail_metrics(&r);
        assert!(t.skewness < 0.0);
        assert!(t.excess_kurtosis > 0.0);
        assert!(t.downside_deviation_ratio > 0.0);
    }
}
