//! Rebalance decision — signal shifts and weight drift against thresholds.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use stratlab_core::InstrumentId;

use crate::optimizer::TargetWeights;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Signal-strength change that forces a rebalance (default 0.15).
    pub signal_threshold: f64,
    /// Live-vs-target weight drift that forces a rebalance (default 0.05).
    pub drift_threshold: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            signal_threshold: 0.15,
            drift_threshold: 0.05,
        }
    }
}

/// Why an instrument calls for a rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RebalanceTrigger {
    SignalChange {
        instrument: InstrumentId,
        previous: f64,
        current: f64,
    },
    WeightDrift {
        instrument: InstrumentId,
        target: f64,
        live: f64,
    },
}

impl RebalanceTrigger {
    pub fn instrument(&self) -> &str {
        match self {
            RebalanceTrigger::SignalChange { instrument, .. }
            | RebalanceTrigger::WeightDrift { instrument, .. } => instrument,
        }
    }
}

/// Every instrument whose signal moved or whose weight drifted past its
/// threshold. An instrument missing from one side counts as 0.0 there.
/// Both comparisons are strict.
pub fn rebalance_triggers(
    previous_signals: &BTreeMap<InstrumentId, f64>,
    current_signals: &BTreeMap<InstrumentId, f64>,
    target: &TargetWeights,
    live: &TargetWeights,
    config: &RebalanceConfig,
) -> Vec<RebalanceTrigger> {
    let mut triggers = Vec::new();

    let signal_ids: BTreeSet<&InstrumentId> =
        previous_signals.keys().chain(current_signals.keys()).collect();
    for id in signal_ids {
        let previous = previous_signals.get(id).copied().unwrap_or(0.0);
        let current = current_signals.get(id).copied().unwrap_or(0.0);
        if (current - previous).abs() > config.signal_threshold {
            triggers.push(RebalanceTrigger::SignalChange {
                instrument: id.clone(),
                previous,
                current,
            });
        }
    }

    let weight_ids: BTreeSet<&InstrumentId> = target.0.keys().chain(live.0.keys()).collect();
    for id in weight_ids {
        let (t, l) = (target.get(id), live.get(id));
        if (l - t).abs() > config.drift_threshold {
            triggers.push(RebalanceTrigger::WeightDrift {
                instrument: id.clone(),
                target: t,
                live: l,
            });
        }
    }

    triggers
}

pub fn should_rebalance(
    previous_signals: &BTreeMap<InstrumentId, f64>,
    current_signals: &BTreeMap<InstrumentId, f64>,
    target: &TargetWeights,
    live: &TargetWeights,
    config: &RebalanceConfig,
) -> bool {
    !rebalance_triggers(previous_signals, current_signals, target, live, config).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f64)]) -> BTreeMap<InstrumentId, f64> {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    fn weights(pairs: &[(&str, f64)]) -> TargetWeights {
        TargetWeights(map(pairs))
    }

    #[test]
    fn quiet_market_holds() {
        let config = RebalanceConfig::default();
        assert!(!should_rebalance(
            &map(&[("SPY", 0.5)]),
            &map(&[("SPY", 0.6)]),
            &weights(&[("SPY", 0.5)]),
            &weights(&[("SPY", 0.53)]),
            &config,
        ));
    }

    #[test]
    fn signal_jump_triggers() {
        let triggers = rebalance_triggers(
            &map(&[("SPY", 0.2), ("TLT", 0.4)]),
            &map(&[("SPY", 0.5), ("TLT", 0.45)]),
            &TargetWeights::default(),
            &TargetWeights::default(),
            &RebalanceConfig::default(),
        );
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].instrument(), "SPY");
        assert!(matches!(triggers[0], RebalanceTrigger::SignalChange { .. }));
    }

    #[test]
    fn drift_triggers_including_new_positions() {
        let triggers = rebalance_triggers(
            &BTreeMap::new(),
            &BTreeMap::new(),
            &weights(&[("SPY", 0.5), ("GLD", 0.1)]),
            &weights(&[("SPY", 0.58)]),
            &RebalanceConfig::default(),
        );
        let ids: Vec<&str> = triggers.iter().map(RebalanceTrigger::instrument).collect();
        assert_eq!(ids, vec!["GLD", "SPY"]);
    }

    #[test]
    fn threshold_is_strict() {
        let config = RebalanceConfig {
            signal_threshold: 0.25,
            drift_threshold: 0.25,
        };
        assert!(!should_rebalance(
            &map(&[("A", 0.25)]),
            &map(&[("A", 0.5)]),
            &weights(&[("A", 0.5)]),
            &weights(&[("A", 0.75)]),
            &config,
        ));
    }

    #[test]
    fn dropped_signal_counts_as_zero() {
        assert!(should_rebalance(
            &map(&[("A", 0.3)]),
            &BTreeMap::new(),
            &TargetWeights::default(),
            &TargetWeights::default(),
            &RebalanceConfig::default(),
        ));
    }
}
