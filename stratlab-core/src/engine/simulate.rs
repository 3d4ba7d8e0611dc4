//! Single-strategy replay: signals × returns, net of direction-change costs.
//!
//! The signal in force for the return dated `d` is the latest signal dated
//! strictly before `d`. A signal dated on `d` first affects the next period,
//! so a strategy is flat until its first signal has been observed.

use crate::domain::{Direction, ReturnSeries, SignalSeries};

/// Per-period output of a replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationPath {
    pub returns: Vec<f64>,
    pub exposures: Vec<f64>,
    pub costs: Vec<f64>,
    /// Number of direction changes.
    pub trade_count: usize,
}

/// Replay `signals` over `market`.
///
/// Each period compounds as `(1 + exposure·r)·(1 − cost) − 1`, where cost is
/// `side_cost × sides crossed` when the direction changes (one side to enter
/// or exit, two to reverse) and zero otherwise.
pub fn simulate(
    market: &ReturnSeries,
    signals: &SignalSeries,
    side_cost: f64,
    scale_by_conviction: bool,
) -> SimulationPath {
    let n = market.len();
    let mut path = SimulationPath {
        returns: Vec::with_capacity(n),
        exposures: Vec::with_capacity(n),
        costs: Vec::with_capacity(n),
        trade_count: 0,
    };

    let signals = signals.signals();
    let mut next_signal = 0;
    let mut current = None;
    let mut held = Direction::Flat;

    for point in market.points() {
        while next_signal < signals.len() && signals[next_signal].date < point.date {
            current = Some(signals[next_signal]);
            next_signal += 1;
        }

        let (direction, exposure) = match current {
            Some(signal) => (signal.direction, signal.exposure(scale_by_conviction)),
            None => (Direction::Flat, 0.0),
        };

        let sides = held.sides_crossed(direction);
        let cost = if sides > 0 {
            path.trade_count += 1;
            side_cost * f64::from(sides)
        } else {
            0.0
        };
        held = direction;

        path.returns
            .push((1.0 + exposure * point.value) * (1.0 - cost) - 1.0);
        path.exposures.push(exposure);
        path.costs.push(cost);
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn market(values: &[f64]) -> ReturnSeries {
        ReturnSeries::from_pairs(values.iter().enumerate().map(|(i, &v)| (d(i as u32 + 2), v)))
            .unwrap()
    }

    #[test]
    fn no_signals_stays_flat() {
        let path = simulate(&market(&[0.01, -0.02]), &SignalSeries::default(), 0.001, true);
        assert_eq!(path.returns, vec![0.0, 0.0]);
        assert_eq!(path.trade_count, 0);
    }

    #[test]
    fn signal_applies_from_next_period() {
        // Market dates start on the 2nd; a signal on the 2nd acts from the 3rd.
        let signals = SignalSeries::new(vec![Signal::long(d(2))]).unwrap();
        let path = simulate(&market(&[0.05, 0.01, 0.02]), &signals, 0.0, true);
        assert_eq!(path.exposures, vec![0.0, 1.0, 1.0]);
        assert_eq!(path.returns[0], 0.0);
        assert!((path.returns[1] - 0.01).abs() < 1e-15);
    }

    #[test]
    fn reversal_costs_two_sides() {
        let signals =
            SignalSeries::new(vec![Signal::long(d(1)), Signal::short(d(2))]).unwrap();
        let path = simulate(&market(&[0.0, 0.0]), &signals, 0.001, false);
        assert_eq!(path.trade_count, 2);
        assert!((path.costs[0] - 0.001).abs() < 1e-15);
        assert!((path.costs[1] - 0.002).abs() < 1e-15);
        assert!((path.returns[1] + 0.002).abs() < 1e-15);
    }

    #[test]
    fn conviction_scales_exposure_without_cost() {
        let signals = SignalSeries::new(vec![
            Signal::new(d(1), Direction::Long, 0.5),
            Signal::new(d(2), Direction::Long, 1.0),
        ])
        .unwrap();
        let path = simulate(&market(&[0.02, 0.02]), &signals, 0.001, true);
        assert_eq!(path.exposures, vec![0.5, 1.0]);
        assert_eq!(path.trade_count, 1);
        assert_eq!(path.costs[1], 0.0);
    }

    #[test]
    fn short_profits_from_decline() {
        let signals = SignalSeries::new(vec![Signal::short(d(1))]).unwrap();
        let path = simulate(&market(&[-0.03]), &signals, 0.0, true);
        assert!((path.returns[0] - 0.03).abs() < 1e-15);
    }
}
