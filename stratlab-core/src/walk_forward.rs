//! Walk-forward validation — sliding train/test windows and overfit ratio.
//!
//! The strategy is replayed once over the full history; each window then
//! slices the per-period strategy returns into a train span (in-sample) and
//! the test span that immediately follows it (out-of-sample).
//!
//! Overfit ratio = mean OOS Sharpe / mean IS Sharpe. A ratio below the
//! configured threshold raises a warning but never fails the run.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analytics::sharpe_ratio;
use crate::config::BacktestConfig;
use crate::domain::{ReturnSeries, SignalSeries};
use crate::engine::BacktestEngine;
use crate::stats::{one_sided_t_test, TTestResult, ZERO_VARIANCE_EPS};

// ─── Configuration ───────────────────────────────────────────────────

/// How the train span moves between windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// Fixed-length train span sliding with the test span.
    #[default]
    Rolling,
    /// Train span anchored at the first period, growing by `step`.
    Expanding,
}

/// What to do with a final test span shorter than `test_span`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialWindowPolicy {
    #[default]
    Drop,
    /// Keep it, with the test span cut at the last period.
    Truncate,
}

/// Configuration for walk-forward validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// In-sample periods per window (default 252 = 1 year).
    pub train_span: usize,
    /// Out-of-sample periods per window (default 63 = 1 quarter).
    pub test_span: usize,
    /// Periods between consecutive window starts. Must equal `test_span`
    /// so test windows tile the history without gaps (default 63).
    pub step: usize,
    pub mode: WindowMode,
    pub partial_window: PartialWindowPolicy,
    /// Overfit ratio below this raises the warning (default 0.5).
    pub overfit_threshold: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_span: 252,
            test_span: 63,
            step: 63,
            mode: WindowMode::Rolling,
            partial_window: PartialWindowPolicy::Drop,
            overfit_threshold: 0.5,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), WalkForwardError> {
        if self.train_span == 0 || self.test_span == 0 {
            return Err(WalkForwardError::InvalidSpan {
                train_span: self.train_span,
                test_span: self.test_span,
            });
        }
        if self.step < self.test_span {
            return Err(WalkForwardError::OverlappingTestWindows {
                step: self.step,
                test_span: self.test_span,
            });
        }
        if self.step > self.test_span {
            return Err(WalkForwardError::GappedTestWindows {
                step: self.step,
                test_span: self.test_span,
            });
        }
        if !self.overfit_threshold.is_finite() {
            return Err(WalkForwardError::InvalidThreshold(self.overfit_threshold));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalkForwardError {
    #[error("train and test spans must be positive (train {train_span}, test {test_span})")]
    InvalidSpan { train_span: usize, test_span: usize },
    #[error("step {step} < test span {test_span} would overlap test windows")]
    OverlappingTestWindows { step: usize, test_span: usize },
    #[error("step {step} > test span {test_span} would leave gaps between test windows")]
    GappedTestWindows { step: usize, test_span: usize },
    #[error("overfit threshold must be finite, got {0}")]
    InvalidThreshold(f64),
    #[error("{dates} dates but {returns} returns")]
    LengthMismatch { dates: usize, returns: usize },
}

// ─── Windows ─────────────────────────────────────────────────────────

/// One train/test split. Dates are inclusive; index ranges are half-open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
    pub train_range: (usize, usize),
    pub test_range: (usize, usize),
}

/// Partition `dates` into train/test windows.
///
/// Returns an empty list when the history is shorter than one train span
/// plus one test span (or one full test span under `Drop`).
pub fn create_windows(
    dates: &[NaiveDate],
    config: &WalkForwardConfig,
) -> Result<Vec<Window>, WalkForwardError> {
    config.validate()?;
    let n = dates.len();
    let mut windows = Vec::new();

    for k in 0.. {
        let (train_start, train_end) = match config.mode {
            WindowMode::Rolling => (k * config.step, k * config.step + config.train_span),
            WindowMode::Expanding => (0, config.train_span + k * config.step),
        };
        let test_start = train_end;
        if test_start >= n {
            break;
        }
        let mut test_end = test_start + config.test_span;
        if test_end > n {
            match config.partial_window {
                PartialWindowPolicy::Drop => break,
                PartialWindowPolicy::Truncate => test_end = n,
            }
        }
        windows.push(Window {
            index: k,
            train_start: dates[train_start],
            train_end: dates[train_end - 1],
            test_start: dates[test_start],
            test_end: dates[test_end - 1],
            train_range: (train_start, train_end),
            test_range: (test_start, test_end),
        });
        if test_end == n {
            break;
        }
    }

    Ok(windows)
}

// ─── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: Window,
    pub is_sharpe: f64,
    pub oos_sharpe: f64,
    pub train_samples: usize,
    pub test_samples: usize,
    /// Compounded return over the test span.
    pub oos_return: f64,
}

/// Outcome of the overfit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverfitFlag {
    /// Ratio at or above the threshold.
    Healthy,
    /// Ratio below the threshold.
    Overfit,
    /// Mean in-sample Sharpe is negative; the ratio is not meaningful.
    NegativeInSample,
    /// No windows, or mean in-sample Sharpe is zero.
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub windows: Vec<WindowResult>,
    pub mean_is_sharpe: f64,
    pub mean_oos_sharpe: f64,
    /// mean OOS / mean IS; None when `flag` is `Undefined` or `NegativeInSample`.
    pub overfit_ratio: Option<f64>,
    pub flag: OverfitFlag,
    pub overfit_warning: bool,
    /// One-sided t-test on the per-window OOS Sharpe values.
    pub oos_t_test: Option<TTestResult>,
}

impl WalkForwardResult {
    pub fn n_windows(&self) -> usize {
        self.windows.len()
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────

/// Replay `signals` over `market` once, then evaluate every window.
pub fn run_walk_forward(
    engine: &BacktestEngine,
    instrument: &str,
    signals: &SignalSeries,
    market: &ReturnSeries,
    config: &WalkForwardConfig,
) -> Result<WalkForwardResult, WalkForwardError> {
    let full = engine.run_single(instrument, signals, market);
    evaluate_returns(&market.dates(), &full.returns, config, engine.config())
}

/// Evaluate windows over an already simulated strategy return path.
pub fn evaluate_returns(
    dates: &[NaiveDate],
    returns: &[f64],
    config: &WalkForwardConfig,
    backtest: &BacktestConfig,
) -> Result<WalkForwardResult, WalkForwardError> {
    if dates.len() != returns.len() {
        return Err(WalkForwardError::LengthMismatch {
            dates: dates.len(),
            returns: returns.len(),
        });
    }
    let windows = create_windows(dates, config)?;
    debug!(windows = windows.len(), periods = dates.len(), "walk-forward windows created");

    let rf = backtest.risk_free_rate / backtest.periods_per_year;
    let ppy = backtest.periods_per_year;
    let evaluate = |window: &Window| {
        let train = &returns[window.train_range.0..window.train_range.1];
        let test = &returns[window.test_range.0..window.test_range.1];
        WindowResult {
            window: window.clone(),
            is_sharpe: sharpe_ratio(train, rf, ppy),
            oos_sharpe: sharpe_ratio(test, rf, ppy),
            train_samples: train.len(),
            test_samples: test.len(),
            oos_return: test.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0,
        }
    };
    let results: Vec<WindowResult> = if backtest.parallel {
        windows.par_iter().map(evaluate).collect()
    } else {
        windows.iter().map(evaluate).collect()
    };

    let result = summarize(results, config.overfit_threshold);
    if result.overfit_warning {
        warn!(
            ratio = ?result.overfit_ratio,
            threshold = config.overfit_threshold,
            "out-of-sample Sharpe degrades below threshold"
        );
    }
    info!(
        windows = result.windows.len(),
        mean_is = result.mean_is_sharpe,
        mean_oos = result.mean_oos_sharpe,
        flag = ?result.flag,
        "walk-forward complete"
    );
    Ok(result)
}

fn summarize(windows: Vec<WindowResult>, threshold: f64) -> WalkForwardResult {
    if windows.is_empty() {
        return WalkForwardResult {
            windows,
            mean_is_sharpe: 0.0,
            mean_oos_sharpe: 0.0,
            overfit_ratio: None,
            flag: OverfitFlag::Undefined,
            overfit_warning: false,
            oos_t_test: None,
        };
    }

    let n = windows.len() as f64;
    let mean_is_sharpe = windows.iter().map(|w| w.is_sharpe).sum::<f64>() / n;
    let mean_oos_sharpe = windows.iter().map(|w| w.oos_sharpe).sum::<f64>() / n;
    let (overfit_ratio, flag) = overfit_ratio(mean_is_sharpe, mean_oos_sharpe, threshold);

    let oos: Vec<f64> = windows.iter().map(|w| w.oos_sharpe).collect();
    WalkForwardResult {
        oos_t_test: one_sided_t_test(&oos),
        windows,
        mean_is_sharpe,
        mean_oos_sharpe,
        overfit_ratio,
        flag,
        overfit_warning: flag == OverfitFlag::Overfit,
    }
}

fn overfit_ratio(mean_is: f64, mean_oos: f64, threshold: f64) -> (Option<f64>, OverfitFlag) {
    if mean_is.abs() < ZERO_VARIANCE_EPS {
        (None, OverfitFlag::Undefined)
    } else if mean_is < 0.0 {
        (None, OverfitFlag::NegativeInSample)
    } else {
        let ratio = mean_oos / mean_is;
        let flag = if ratio < threshold {
            OverfitFlag::Overfit
        } else {
            OverfitFlag::Healthy
        };
        (Some(ratio), flag)
    }
}
