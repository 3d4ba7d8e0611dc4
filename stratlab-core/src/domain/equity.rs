//! Equity curves — compounded cumulative return per date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One point on an equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    /// Cumulative return since inception (0.0 = flat, 0.1 = +10%).
    pub cumulative_return: f64,
}

/// Immutable equity curve owned by the computation that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub(crate) fn from_points(points: Vec<EquityPoint>) -> Self {
        Self { points }
    }

    /// Compound a per-period return series into a curve.
    pub fn from_returns(dates: &[NaiveDate], returns: &[f64]) -> Self {
        let mut growth = 1.0;
        let points = dates
            .iter()
            .zip(returns)
            .map(|(&date, &r)| {
                growth *= 1.0 + r;
                EquityPoint {
                    date,
                    cumulative_return: growth - 1.0,
                }
            })
            .collect();
        Self { points }
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn cumulative_returns(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.cumulative_return).collect()
    }

    /// Growth of one unit: `1 + cumulative_return`.
    pub fn growth_index(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|p| 1.0 + p.cumulative_return)
            .collect()
    }

    /// Cumulative return at the last date, 0.0 when empty.
    pub fn final_return(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.cumulative_return)
    }
}
