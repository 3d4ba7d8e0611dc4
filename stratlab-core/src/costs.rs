//! Transaction cost model — per-instrument basis-point lookup.
//!
//! Resolution order for an instrument identifier:
//! 1. exact match in the cost table
//! 2. longest table key that is a prefix of the identifier (ticker families,
//!    e.g. futures contracts sharing a root like `ES` → `ESH5`, `ESM5`)
//! 3. the schedule's default
//!
//! Table values are per-side costs. Unknown instruments are never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serializable cost table, typically read from the `[costs]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostScheduleConfig {
    /// Per-side cost in basis points when no entry matches.
    pub default_bps: f64,
    /// Exact identifiers or prefixes → per-side cost in basis points.
    pub entries: BTreeMap<String, f64>,
}

impl Default for CostScheduleConfig {
    fn default() -> Self {
        Self {
            default_bps: 5.0,
            entries: BTreeMap::new(),
        }
    }
}

/// Errors building a cost schedule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostError {
    #[error("cost for {instrument:?} must be a finite non-negative bps value, got {bps}")]
    InvalidCost { instrument: String, bps: f64 },
    #[error("default cost must be a finite non-negative bps value, got {0}")]
    InvalidDefault(f64),
    #[error("cost table contains an empty identifier")]
    EmptyIdentifier,
}

/// Where a resolved cost came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostSource {
    Exact,
    Prefix(String),
    Default,
}

/// A resolved per-side cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostResolution {
    pub bps: f64,
    pub source: CostSource,
}

/// Immutable per-instrument cost schedule.
///
/// Built once by the caller and passed by reference, so repeated runs with
/// different defaults never share state.
#[derive(Debug, Clone, PartialEq)]
pub struct CostSchedule {
    entries: BTreeMap<String, f64>,
    default_bps: f64,
}

impl CostSchedule {
    pub fn new<I, S>(entries: I, default_bps: f64) -> Result<Self, CostError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        if !default_bps.is_finite() || default_bps < 0.0 {
            return Err(CostError::InvalidDefault(default_bps));
        }
        let mut table = BTreeMap::new();
        for (key, bps) in entries {
            let key = key.into();
            if key.is_empty() {
                return Err(CostError::EmptyIdentifier);
            }
            if !bps.is_finite() || bps < 0.0 {
                return Err(CostError::InvalidCost {
                    instrument: key,
                    bps,
                });
            }
            table.insert(key, bps);
        }
        Ok(Self {
            entries: table,
            default_bps,
        })
    }

    /// Schedule with no table entries.
    pub fn flat(default_bps: f64) -> Result<Self, CostError> {
        Self::new(std::iter::empty::<(String, f64)>(), default_bps)
    }

    /// Zero-cost schedule.
    pub fn frictionless() -> Self {
        Self {
            entries: BTreeMap::new(),
            default_bps: 0.0,
        }
    }

    pub fn from_config(config: &CostScheduleConfig) -> Result<Self, CostError> {
        Self::new(
            config.entries.iter().map(|(k, v)| (k.clone(), *v)),
            config.default_bps,
        )
    }

    pub fn default_bps(&self) -> f64 {
        self.default_bps
    }

    /// Resolve the per-side cost and report which rule matched.
    pub fn resolve(&self, instrument: &str) -> CostResolution {
        if let Some(&bps) = self.entries.get(instrument) {
            return CostResolution {
                bps,
                source: CostSource::Exact,
            };
        }
        let longest = self
            .entries
            .iter()
            .filter(|(key, _)| instrument.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len());
        match longest {
            Some((key, &bps)) => CostResolution {
                bps,
                source: CostSource::Prefix(key.clone()),
            },
            None => CostResolution {
                bps: self.default_bps,
                source: CostSource::Default,
            },
        }
    }

    /// Per-side cost in basis points.
    pub fn cost_bps(&self, instrument: &str) -> f64 {
        self.resolve(instrument).bps
    }

    /// Entry + exit cost in basis points.
    pub fn round_trip_bps(&self, instrument: &str) -> f64 {
        2.0 * self.cost_bps(instrument)
    }

    /// Entry + exit cost as a fraction (10 bps round trip → 0.001).
    pub fn round_trip_fraction(&self, instrument: &str) -> f64 {
        self.round_trip_bps(instrument) / 10_000.0
    }

    /// Per-side cost as a fraction.
    pub fn side_fraction(&self, instrument: &str) -> f64 {
        self.cost_bps(instrument) / 10_000.0
    }
}

impl Default for CostSchedule {
    fn default() -> Self {
        Self::frictionless()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> CostSchedule {
        CostSchedule::new([("SPY", 1.0), ("ES", 2.5), ("ESM", 3.0), ("CL", 4.0)], 10.0).unwrap()
    }

    #[test]
    fn exact_match_wins() {
        let costs = schedule();
        assert_eq!(costs.cost_bps("SPY"), 1.0);
        assert_eq!(costs.resolve("ES").source, CostSource::Exact);
        assert_eq!(costs.cost_bps("ES"), 2.5);
    }

    #[test]
    fn longest_prefix_wins() {
        let costs = schedule();
        assert_eq!(costs.cost_bps("ESH5"), 2.5);
        assert_eq!(costs.cost_bps("ESM5"), 3.0);
        assert_eq!(
            costs.resolve("ESM5").source,
            CostSource::Prefix("ESM".to_string())
        );
    }

    #[test]
    fn unknown_falls_back_to_default() {
        let costs = schedule();
        assert_eq!(costs.cost_bps("QQQ"), 10.0);
        assert_eq!(costs.resolve("QQQ").source, CostSource::Default);
    }

    #[test]
    fn round_trip_is_entry_plus_exit() {
        let costs = schedule();
        assert_eq!(costs.round_trip_bps("CLZ4"), 8.0);
        assert!((costs.round_trip_fraction("CLZ4") - 0.0008).abs() < 1e-15);
        assert!((costs.side_fraction("SPY") - 0.0001).abs() < 1e-15);
    }

    #[test]
    fn rejects_negative_cost() {
        let err = CostSchedule::new([("SPY", -1.0)], 5.0).unwrap_err();
        assert!(matches!(err, CostError::InvalidCost { .. }));
        assert!(matches!(
            CostSchedule::flat(f64::NAN),
            Err(CostError::InvalidDefault(_))
        ));
    }

    #[test]
    fn rejects_empty_identifier() {
        assert_eq!(
            CostSchedule::new([("", 1.0)], 5.0).unwrap_err(),
            CostError::EmptyIdentifier
        );
    }

    #[test]
    fn from_config_round_trip() {
        let mut config = CostScheduleConfig::default();
        config.entries.insert("6E".into(), 1.5);
        let costs = CostSchedule::from_config(&config).unwrap();
        assert_eq!(costs.cost_bps("6EH5"), 1.5);
        assert_eq!(costs.cost_bps("AAPL"), config.default_bps);
    }

    #[test]
    fn frictionless_is_zero_everywhere() {
        let costs = CostSchedule::frictionless();
        assert_eq!(costs.cost_bps("anything"), 0.0);
        assert_eq!(costs.round_trip_fraction("anything"), 0.0);
    }
}
