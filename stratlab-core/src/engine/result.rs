//! Backtest result types — immutable, serde-serializable.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analytics::PerformanceMetrics;
use crate::domain::{EquityCurve, InstrumentId, StrategyId};

/// Result of one strategy run against one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_id: Option<StrategyId>,
    pub instrument: InstrumentId,
    pub equity_curve: EquityCurve,
    /// Net strategy return per period, aligned with the equity curve dates.
    pub returns: Vec<f64>,
    /// Signed exposure held during each period.
    pub exposures: Vec<f64>,
    /// Per-period transaction cost debited, as a fraction.
    pub costs: Vec<f64>,
    pub metrics: PerformanceMetrics,
    /// Per-side cost in bps the schedule resolved for the instrument.
    pub cost_bps: f64,
    pub config_fingerprint: Option<String>,
}

impl BacktestResult {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.equity_curve.dates()
    }

    pub fn total_cost(&self) -> f64 {
        self.costs.iter().sum()
    }
}

/// Pairwise Pearson correlation of aligned strategy returns.
///
/// `values[i][j]` is the correlation of `ids[i]` with `ids[j]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub ids: Vec<StrategyId>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.ids.iter().position(|id| id == a)?;
        let j = self.ids.iter().position(|id| id == b)?;
        Some(self.values[i][j])
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Result of a weighted multi-strategy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioResult {
    /// Combined cumulative return, Σ wᵢ·eᵢ on the union of dates.
    pub equity_curve: EquityCurve,
    /// Per-period portfolio returns derived from the combined curve.
    pub returns: Vec<f64>,
    pub metrics: PerformanceMetrics,
    pub weights: BTreeMap<StrategyId, f64>,
    /// wᵢ · final cumulative return of strategy i.
    pub attribution: BTreeMap<StrategyId, f64>,
    /// Per-strategy cumulative returns after alignment onto the union dates.
    pub aligned_curves: BTreeMap<StrategyId, Vec<f64>>,
    pub correlation: CorrelationMatrix,
    pub strategies: BTreeMap<StrategyId, BacktestResult>,
    pub config_fingerprint: Option<String>,
}

impl PortfolioResult {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.equity_curve.dates()
    }

    /// Combined cumulative return at the last aligned date.
    pub fn total_weighted_return(&self) -> f64 {
        self.equity_curve.final_return()
    }

    pub fn attribution_total(&self) -> f64 {
        self.attribution.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_lookup_by_id() {
        let m = CorrelationMatrix {
            ids: vec!["a".into(), "b".into()],
            values: vec![vec![1.0, 0.3], vec![0.3, 1.0]],
        };
        assert_eq!(m.get("a", "b"), Some(0.3));
        assert_eq!(m.get("b", "b"), Some(1.0));
        assert_eq!(m.get("a", "z"), None);
        assert_eq!(m.len(), 2);
    }
}
