//! Multi-strategy combination: date alignment, weighting, attribution.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::domain::{EquityCurve, EquityPoint, StrategyId};
use crate::stats::pearson_correlation;

use super::result::CorrelationMatrix;

/// Sorted union of every curve's dates.
pub fn union_dates<'a, I>(curves: I) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = &'a EquityCurve>,
{
    let dates: BTreeSet<NaiveDate> = curves
        .into_iter()
        .flat_map(|c| c.points().iter().map(|p| p.date))
        .collect();
    dates.into_iter().collect()
}

/// Cumulative return of `curve` at each of `dates`.
///
/// Dates inside the curve's range that it lacks take the last known value.
/// Dates before its first point take the first value. An empty curve aligns
/// to all zeros.
pub fn align_curve(curve: &EquityCurve, dates: &[NaiveDate]) -> Vec<f64> {
    let points = curve.points();
    let Some(first) = points.first() else {
        return vec![0.0; dates.len()];
    };
    let mut out = Vec::with_capacity(dates.len());
    let mut idx = 0;
    let mut last = first.cumulative_return;
    for &date in dates {
        while idx < points.len() && points[idx].date <= date {
            last = points[idx].cumulative_return;
            idx += 1;
        }
        out.push(last);
    }
    out
}

/// Σ wᵢ·cumᵢ at each aligned date.
pub fn combine(dates: &[NaiveDate], aligned: &[(f64, &[f64])]) -> EquityCurve {
    let points = dates
        .iter()
        .enumerate()
        .map(|(t, &date)| EquityPoint {
            date,
            cumulative_return: aligned.iter().map(|(w, cum)| w * cum[t]).sum(),
        })
        .collect();
    EquityCurve::from_points(points)
}

/// Per-period returns implied by a cumulative path starting from a 1.0 base.
///
/// A period that starts from a non-positive index contributes 0.0.
pub fn returns_from_cumulative(cumulative: &[f64]) -> Vec<f64> {
    let mut prev = 1.0;
    cumulative
        .iter()
        .map(|&c| {
            let growth = 1.0 + c;
            let r = if prev > 0.0 { growth / prev - 1.0 } else { 0.0 };
            prev = growth;
            r
        })
        .collect()
}

/// Pairwise correlations of aligned returns, in id order.
pub fn correlation_matrix(returns: &BTreeMap<StrategyId, Vec<f64>>) -> CorrelationMatrix {
    let ids: Vec<StrategyId> = returns.keys().cloned().collect();
    let series: Vec<&Vec<f64>> = returns.values().collect();
    let n = ids.len();
    let mut values = vec![vec![0.0; n]; n];
    for i in 0..n {
        values[i][i] = 1.0;
        for j in (i + 1)..n {
            let rho = pearson_correlation(series[i], series[j]);
            values[i][j] = rho;
            values[j][i] = rho;
        }
    }
    CorrelationMatrix { ids, values }
}
