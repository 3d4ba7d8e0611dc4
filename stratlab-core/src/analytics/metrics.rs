//! Performance metrics — per-period returns in, scalar out.

use serde::{Deserialize, Serialize};

use crate::config::BacktestConfig;
use crate::stats::{mean, percentile, std_dev, ZERO_VARIANCE_EPS};

/// Aggregate performance metrics for one backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub annualized_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub turnover: f64,
    /// Number of direction changes (entries, exits, reversals).
    pub trade_count: usize,
    pub n_periods: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics from per-period returns and the exposure path
    /// that produced them.
    pub fn compute(
        returns: &[f64],
        exposures: &[f64],
        trade_count: usize,
        config: &BacktestConfig,
    ) -> Self {
        let ppy = config.periods_per_year;
        let rf_per_period = config.risk_free_rate / ppy;
        Self {
            total_return: total_return(returns),
            cagr: cagr(returns, ppy),
            annualized_volatility: annualized_volatility(returns, ppy),
            sharpe: sharpe_ratio(returns, rf_per_period, ppy),
            sortino: sortino_ratio(returns, rf_per_period, ppy),
            calmar: calmar_ratio(returns, ppy),
            max_drawdown: max_drawdown(&growth_index(returns)),
            win_rate: win_rate(returns),
            turnover: turnover(exposures),
            trade_count,
            n_periods: returns.len(),
        }
    }
}

// ─── Return-based metrics ────────────────────────────────────────────

/// Compounded total return.
pub fn total_return(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Compound annual growth rate. 0.0 for fewer than 2 periods or wipe-out.
pub fn cagr(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let growth = 1.0 + total_return(returns);
    if growth <= 0.0 {
        return 0.0;
    }
    let years = returns.len() as f64 / periods_per_year;
    growth.powf(1.0 / years) - 1.0
}

pub fn annualized_volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    std_dev(returns) * periods_per_year.max(0.0).sqrt()
}

/// Annualized Sharpe ratio.
///
/// Sharpe = mean(r - rf) / std(r - rf) * sqrt(periods_per_year).
/// Returns 0.0 if variance is zero or fewer than 2 periods.
pub fn sharpe_ratio(returns: &[f64], risk_free_per_period: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - risk_free_per_period).collect();
    let std = std_dev(&excess);
    if std < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    mean(&excess) / std * periods_per_year.max(0.0).sqrt()
}

/// Annualized Sortino ratio (downside deviation below `target` only).
///
/// Downside deviation uses the full sample size in the denominator.
/// Returns 0.0 when there is no downside.
pub fn sortino_ratio(returns: &[f64], target: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - target).collect();
    let downside_sq: f64 = excess.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    mean(&excess) / downside_std * periods_per_year.max(0.0).sqrt()
}

/// Information ratio: mean(active) / std(active) * sqrt(periods_per_year).
///
/// Uses the common prefix when lengths differ. Pass `periods_per_year = 1.0`
/// for the raw per-period ratio.
pub fn information_ratio(returns: &[f64], benchmark: &[f64], periods_per_year: f64) -> f64 {
    let n = returns.len().min(benchmark.len());
    if n < 2 {
        return 0.0;
    }
    let active: Vec<f64> = returns[..n]
        .iter()
        .zip(&benchmark[..n])
        .map(|(r, b)| r - b)
        .collect();
    let std = std_dev(&active);
    if std < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    mean(&active) / std * periods_per_year.max(0.0).sqrt()
}

/// Tail ratio: |right tail percentile| / |left tail percentile|.
///
/// `tail` is the right-tail quantile in (0.5, 1), e.g. 0.95 compares the 95th
/// and 5th percentiles.
pub fn tail_ratio(returns: &[f64], tail: f64) -> f64 {
    if returns.len() < 2 || !(0.5..1.0).contains(&tail) {
        return 0.0;
    }
    let right = percentile(returns, tail * 100.0).abs();
    let left = percentile(returns, (1.0 - tail) * 100.0).abs();
    if left < ZERO_VARIANCE_EPS {
        return 0.0;
    }
    right / left
}

/// Average absolute change in position weight per period.
pub fn turnover(weights: &[f64]) -> f64 {
    if weights.len() < 2 {
        return 0.0;
    }
    weights.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (weights.len() - 1) as f64
}

/// Fraction of active (non-zero) periods with a positive return.
pub fn win_rate(returns: &[f64]) -> f64 {
    let active: Vec<&f64> = returns.iter().filter(|r| r.abs() > 0.0).collect();
    if active.is_empty() {
        return 0.0;
    }
    active.iter().filter(|r| ***r > 0.0).count() as f64 / active.len() as f64
}

/// Calmar ratio: CAGR / |max drawdown|. 0.0 without drawdown or growth.
pub fn calmar_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let c = cagr(returns, periods_per_year);
    let dd = max_drawdown(&growth_index(returns));
    if dd >= 0.0 || c <= 0.0 {
        return 0.0;
    }
    c / dd.abs()
}

/// Rolling annualized Sharpe over a sliding window.
///
/// Output length is `returns.len() - (window - 1)`; positions before the
/// first full window are omitted rather than zero-filled. Empty when the
/// window is zero or longer than the series.
pub fn rolling_sharpe(returns: &[f64], window: usize, periods_per_year: f64) -> Vec<f64> {
    if window == 0 || window > returns.len() {
        return Vec::new();
    }
    returns
        .windows(window)
        .map(|w| sharpe_ratio(w, 0.0, periods_per_year))
        .collect()
}

// ─── Equity-path metrics ─────────────────────────────────────────────

/// Growth of one unit for each period (no leading base point).
pub fn growth_index(returns: &[f64]) -> Vec<f64> {
    let mut growth = 1.0;
    returns
        .iter()
        .map(|r| {
            growth *= 1.0 + r;
            growth
        })
        .collect()
}

/// Drawdown from the running peak at each point, as a non-positive fraction.
///
/// The running peak starts at the 1.0 base so a first-period loss counts.
pub fn drawdown_series(growth: &[f64]) -> Vec<f64> {
    let mut peak = 1.0_f64;
    growth
        .iter()
        .map(|&g| {
            peak = peak.max(g);
            if peak > 0.0 {
                (g - peak) / peak
            } else {
                0.0
            }
        })
        .collect()
}

/// Maximum drawdown as a negative fraction (e.g. -0.15 = 15% drawdown).
pub fn max_drawdown(growth: &[f64]) -> f64 {
    drawdown_series(growth)
        .into_iter()
        .fold(0.0_f64, |acc, dd| acc.min(dd))
}
