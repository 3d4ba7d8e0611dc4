//! Stationary block bootstrap of the annualized Sharpe ratio.
//!
//! Geometric block lengths (Politis & Romano, 1994) preserve the serial
//! dependence in returns. The resampler is a seeded `StdRng`, so the same
//! config and input always give the same interval.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::analytics::metrics::sharpe_ratio;
use crate::stats::{percentile_sorted, sorted_copy};

/// Configuration for block bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Number of resamples (default 1000).
    pub n_resamples: usize,
    /// Mean block length in periods (default 20 ≈ one month).
    pub mean_block_length: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    /// Two-sided confidence level of the interval (default 0.90).
    pub confidence: f64,
    /// Fewer observations than this grade as `Insufficient` (default 60).
    pub min_observations: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_resamples: 1000,
            mean_block_length: 20,
            seed: 42,
            confidence: 0.90,
            min_observations: 60,
        }
    }
}

/// Confidence grade from the bootstrap interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceGrade {
    /// Lower bound > 0.5 and width < 3.0.
    High,
    /// Lower bound > 0.0 and width < 5.0.
    Medium,
    Low,
    /// Too few observations to resample.
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub grade: ConfidenceGrade,
    pub sharpe_ci_lower: f64,
    pub sharpe_ci_upper: f64,
    pub sharpe_median: f64,
    pub ci_width: f64,
    pub n_resamples: usize,
    pub sample_size: usize,
}

impl BootstrapResult {
    fn insufficient(sample_size: usize) -> Self {
        Self {
            grade: ConfidenceGrade::Insufficient,
            sharpe_ci_lower: 0.0,
            sharpe_ci_upper: 0.0,
            sharpe_median: 0.0,
            ci_width: 0.0,
            n_resamples: 0,
            sample_size,
        }
    }
}

/// Bootstrap a confidence interval for the annualized Sharpe ratio.
pub fn bootstrap_sharpe(
    returns: &[f64],
    periods_per_year: f64,
    config: &BootstrapConfig,
) -> BootstrapResult {
    let n = returns.len();
    if n < config.min_observations.max(2) || config.n_resamples == 0 {
        return BootstrapResult::insufficient(n);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let p = 1.0 / config.mean_block_length.max(1) as f64;

    let sharpes: Vec<f64> = (0..config.n_resamples)
        .map(|_| {
            let resampled = resample_stationary_block(returns, p, &mut rng);
            sharpe_ratio(&resampled, 0.0, periods_per_year)
        })
        .filter(|s| s.is_finite())
        .collect();

    if sharpes.is_empty() {
        return BootstrapResult::insufficient(n);
    }

    let sorted = sorted_copy(&sharpes);
    let alpha = (1.0 - config.confidence.clamp(0.0, 1.0)) / 2.0;
    let lower = percentile_sorted(&sorted, alpha * 100.0);
    let upper = percentile_sorted(&sorted, (1.0 - alpha) * 100.0);
    let width = upper - lower;

    BootstrapResult {
        grade: assign_grade(lower, width),
        sharpe_ci_lower: lower,
        sharpe_ci_upper: upper,
        sharpe_median: percentile_sorted(&sorted, 50.0),
        ci_width: width,
        n_resamples: sorted.len(),
        sample_size: n,
    }
}

/// One resample: with probability `p` jump to a random start, otherwise
/// continue the current block (wrapping around).
fn resample_stationary_block(returns: &[f64], p: f64, rng: &mut StdRng) -> Vec<f64> {
    let n = returns.len();
    let mut out = Vec::with_capacity(n);
    let mut pos = rng.gen_range(0..n);
    for _ in 0..n {
        out.push(returns[pos]);
        if rng.gen::<f64>() < p {
            pos = rng.gen_range(0..n);
        } else {
            pos = (pos + 1) % n;
        }
    }
    out
}

fn assign_grade(ci_lower: f64, ci_width: f64) -> ConfidenceGrade {
    if ci_lower > 0.5 && ci_width < 3.0 {
        ConfidenceGrade::High
    } else if ci_lower > 0.0 && ci_width < 5.0 {
        ConfidenceGrade::Medium
    } else {
        ConfidenceGrade::Low
    }
}
