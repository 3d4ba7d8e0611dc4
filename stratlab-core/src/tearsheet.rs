//! Tearsheet assembly — every analytics view of one return path in one
//! serializable document.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::{
    bootstrap_sharpe, compute_tail_metrics, deflated_sharpe_from_returns, drawdown_series,
    growth_index, rolling_sharpe, sortino_ratio, tail_ratio, BootstrapResult, DeflatedSharpe,
    PerformanceMetrics, TailMetrics,
};
use crate::config::CoreConfig;
use crate::domain::EquityCurve;
use crate::engine::{BacktestResult, PortfolioResult};
use crate::stats::{excess_kurtosis, mean, percentile_sorted, skewness, sorted_copy};

/// Current schema version of exported tearsheets.
pub const TEARSHEET_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum TearSheetError {
    #[error("tearsheet JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported tearsheet schema version {found} (max supported: {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

// ─── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub metrics: PerformanceMetrics,
    /// Sortino against the configured target return.
    pub sortino_at_target: f64,
    pub tail_ratio: f64,
    pub deflated_sharpe: DeflatedSharpe,
    pub tail: TailMetrics,
    pub bootstrap: BootstrapResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPoint {
    pub date: NaiveDate,
    /// Non-positive fraction below the running peak.
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownSection {
    pub series: Vec<DrawdownPoint>,
    pub max_drawdown: f64,
    /// Longest run of periods spent below a prior peak.
    pub longest_underwater_periods: usize,
}

/// One calendar year of compounded monthly returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearRow {
    /// January..December; `None` for months without data.
    pub months: [Option<f64>; 12],
    /// Compounded return over the months present.
    pub ytd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint {
    pub date: NaiveDate,
    pub sharpe: f64,
}

/// Period-level return statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub best: f64,
    pub worst: f64,
    pub mean: f64,
    pub median: f64,
    pub avg_gain: f64,
    pub avg_loss: f64,
    pub pct_positive: f64,
    pub max_consecutive_gains: usize,
    pub max_consecutive_losses: usize,
}

/// Statistics over holding spans: a trade opens when exposure leaves zero
/// and closes when it returns to zero or flips sign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub count: usize,
    pub win_rate: f64,
    pub avg_return: f64,
    pub best: f64,
    pub worst: f64,
    pub avg_holding_periods: f64,
    /// Compounded return of each trade, in order of entry.
    pub returns: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnDistribution {
    /// Every period return, ascending.
    pub sorted: Vec<f64>,
    pub histogram: Vec<HistogramBin>,
    /// (percentile 0-100, value) pairs.
    pub percentiles: Vec<(f64, f64)>,
    pub skewness: f64,
    pub excess_kurtosis: f64,
    pub cvar_95: f64,
}

/// Full tearsheet for a single strategy or a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TearSheet {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub title: String,
    pub config_fingerprint: Option<String>,
    pub summary: Summary,
    pub equity_curve: EquityCurve,
    pub drawdowns: DrawdownSection,
    pub monthly_returns: BTreeMap<i32, YearRow>,
    pub rolling_sharpe: Vec<RollingPoint>,
    pub period_stats: PeriodStats,
    /// Empty for portfolio tearsheets.
    #[serde(default)]
    pub trade_stats: TradeStats,
    pub distribution: ReturnDistribution,
}

fn default_schema_version() -> u32 {
    TEARSHEET_SCHEMA_VERSION
}

const REPORTED_PERCENTILES: [f64; 7] = [1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0];

impl TearSheet {
    /// Tearsheet for a single-strategy run.
    pub fn build(result: &BacktestResult, config: &CoreConfig) -> Self {
        let title = match &result.strategy_id {
            Some(id) => format!("{id} ({})", result.instrument),
            None => result.instrument.clone(),
        };
        Self::assemble(
            title,
            &result.equity_curve,
            &result.returns,
            &result.metrics,
            trade_stats(&result.returns, &result.exposures),
            result.config_fingerprint.clone(),
            config,
        )
    }

    /// Tearsheet for a combined portfolio run.
    pub fn build_portfolio(result: &PortfolioResult, config: &CoreConfig) -> Self {
        let title = format!("portfolio ({} strategies)", result.weights.len());
        Self::assemble(
            title,
            &result.equity_curve,
            &result.returns,
            &result.metrics,
            TradeStats::default(),
            result.config_fingerprint.clone(),
            config,
        )
    }

    fn assemble(
        title: String,
        curve: &EquityCurve,
        returns: &[f64],
        metrics: &PerformanceMetrics,
        trade_stats: TradeStats,
        config_fingerprint: Option<String>,
        config: &CoreConfig,
    ) -> Self {
        let ppy = config.backtest.periods_per_year;
        let analytics = &config.analytics;
        let dates = curve.dates();

        let summary = Summary {
            metrics: metrics.clone(),
            sortino_at_target: sortino_ratio(returns, analytics.sortino_target, ppy),
            tail_ratio: tail_ratio(returns, analytics.tail_percentile),
            deflated_sharpe: deflated_sharpe_from_returns(returns, analytics.n_trials),
            tail: compute_tail_metrics(returns),
            bootstrap: bootstrap_sharpe(returns, ppy, &config.bootstrap),
        };

        let rolling = rolling_sharpe(returns, analytics.rolling_window, ppy);
        let offset = analytics.rolling_window.saturating_sub(1);
        let rolling_sharpe = dates
            .iter()
            .skip(offset)
            .zip(rolling)
            .map(|(&date, sharpe)| RollingPoint { date, sharpe })
            .collect();

        Self {
            schema_version: TEARSHEET_SCHEMA_VERSION,
            title,
            config_fingerprint,
            summary,
            equity_curve: curve.clone(),
            drawdowns: drawdown_section(&dates, returns),
            monthly_returns: monthly_returns(&dates, returns),
            rolling_sharpe,
            period_stats: period_stats(returns),
            trade_stats,
            distribution: distribution(returns, analytics.histogram_bins),
        }
    }

    pub fn to_json(&self) -> Result<String, TearSheetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an exported tearsheet, rejecting newer schema versions.
    pub fn from_json(json: &str) -> Result<Self, TearSheetError> {
        let sheet: TearSheet = serde_json::from_str(json)?;
        if sheet.schema_version > TEARSHEET_SCHEMA_VERSION {
            return Err(TearSheetError::UnsupportedSchema {
                found: sheet.schema_version,
                supported: TEARSHEET_SCHEMA_VERSION,
            });
        }
        Ok(sheet)
    }
}

// ─── Section builders ────────────────────────────────────────────────

fn drawdown_section(dates: &[NaiveDate], returns: &[f64]) -> DrawdownSection {
    let dd = drawdown_series(&growth_index(returns));
    let mut longest = 0;
    let mut current = 0;
    for &d in &dd {
        if d < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    DrawdownSection {
        max_drawdown: dd.iter().copied().fold(0.0, f64::min),
        series: dates
            .iter()
            .zip(dd)
            .map(|(&date, drawdown)| DrawdownPoint { date, drawdown })
            .collect(),
        longest_underwater_periods: longest,
    }
}

/// Month × year grid of compounded returns with a YTD column.
pub fn monthly_returns(dates: &[NaiveDate], returns: &[f64]) -> BTreeMap<i32, YearRow> {
    let mut growth: BTreeMap<i32, [Option<f64>; 12]> = BTreeMap::new();
    for (date, r) in dates.iter().zip(returns) {
        let row = growth.entry(date.year()).or_insert([None; 12]);
        let slot = &mut row[date.month0() as usize];
        *slot = Some(slot.unwrap_or(1.0) * (1.0 + r));
    }
    growth
        .into_iter()
        .map(|(year, row)| {
            let ytd = row.iter().flatten().product::<f64>() - 1.0;
            let months = row.map(|g| g.map(|g| g - 1.0));
            (year, YearRow { months, ytd })
        })
        .collect()
}

pub fn period_stats(returns: &[f64]) -> PeriodStats {
    if returns.is_empty() {
        return PeriodStats::default();
    }
    let sorted = sorted_copy(returns);
    let gains: Vec<f64> = returns.iter().copied().filter(|&r| r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();

    let (mut max_gains, mut max_losses, mut run_gains, mut run_losses) = (0, 0, 0, 0);
    for &r in returns {
        if r > 0.0 {
            run_gains += 1;
            run_losses = 0;
        } else if r < 0.0 {
            run_losses += 1;
            run_gains = 0;
        } else {
            run_gains = 0;
            run_losses = 0;
        }
        max_gains = max_gains.max(run_gains);
        max_losses = max_losses.max(run_losses);
    }

    PeriodStats {
        best: sorted[sorted.len() - 1],
        worst: sorted[0],
        mean: mean(returns),
        median: percentile_sorted(&sorted, 50.0),
        avg_gain: mean(&gains),
        avg_loss: mean(&losses),
        pct_positive: gains.len() as f64 / returns.len() as f64,
        max_consecutive_gains: max_gains,
        max_consecutive_losses: max_losses,
    }
}

/// Split the path into holding spans and compound each span's returns.
/// A span still open at the end of the data counts as a trade.
pub fn trade_stats(returns: &[f64], exposures: &[f64]) -> TradeStats {
    let mut trades: Vec<(f64, usize)> = Vec::new();
    // (side, growth, periods held)
    let mut open: Option<(f64, f64, usize)> = None;

    for (&r, &exposure) in returns.iter().zip(exposures) {
        let side = if exposure.is_finite() && exposure != 0.0 {
            exposure.signum()
        } else {
            0.0
        };
        if let Some((open_side, growth, held)) = open {
            if side != open_side {
                trades.push((growth - 1.0, held));
                open = None;
            }
        }
        if side != 0.0 {
            let (_, growth, held) = open.get_or_insert((side, 1.0, 0));
            *growth *= 1.0 + r;
            *held += 1;
        }
    }
    if let Some((_, growth, held)) = open {
        trades.push((growth - 1.0, held));
    }

    if trades.is_empty() {
        return TradeStats::default();
    }
    let count = trades.len();
    let returns: Vec<f64> = trades.iter().map(|&(ret, _)| ret).collect();
    let winners = returns.iter().filter(|&&r| r > 0.0).count();
    let held: usize = trades.iter().map(|&(_, held)| held).sum();
    TradeStats {
        count,
        win_rate: winners as f64 / count as f64,
        avg_return: mean(&returns),
        best: returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        worst: returns.iter().copied().fold(f64::INFINITY, f64::min),
        avg_holding_periods: held as f64 / count as f64,
        returns,
    }
}

pub fn distribution(returns: &[f64], bins: usize) -> ReturnDistribution {
    let sorted = sorted_copy(returns);
    let percentiles = if sorted.is_empty() {
        Vec::new()
    } else {
        REPORTED_PERCENTILES
            .iter()
            .map(|&p| (p, percentile_sorted(&sorted, p)))
            .collect()
    };
    ReturnDistribution {
        histogram: histogram(&sorted, bins),
        percentiles,
        skewness: skewness(returns),
        excess_kurtosis: excess_kurtosis(returns),
        cvar_95: compute_tail_metrics(returns).cvar_95,
        sorted,
    }
}

/// Equal-width bins from min to max; the top edge is inclusive.
fn histogram(sorted: &[f64], bins: usize) -> Vec<HistogramBin> {
    let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };
    if bins == 0 {
        return Vec::new();
    }
    if hi - lo <= 0.0 {
        return vec![HistogramBin {
            lower: lo,
            upper: hi,
            count: sorted.len(),
        }];
    }
    let width = (hi - lo) / bins as f64;
    let mut out: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins { hi } else { lo + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();
    for &v in sorted {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        out[idx].count += 1;
    }
    out
}
