//! Explicit strategy registry — strategy id → (instrument, signals).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{InstrumentId, SignalSeries, StrategyId};

/// One registered strategy: the instrument it trades and its signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub instrument: InstrumentId,
    pub signals: SignalSeries,
}

/// Caller-owned registry passed into portfolio runs.
///
/// Registering an existing id replaces the previous definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyRegistry {
    strategies: BTreeMap<StrategyId, StrategyDefinition>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: impl Into<StrategyId>,
        instrument: impl Into<InstrumentId>,
        signals: SignalSeries,
    ) -> Option<StrategyDefinition> {
        self.strategies.insert(
            id.into(),
            StrategyDefinition {
                instrument: instrument.into(),
                signals,
            },
        )
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        id: impl Into<StrategyId>,
        instrument: impl Into<InstrumentId>,
        signals: SignalSeries,
    ) -> Self {
        self.register(id, instrument, signals);
        self
    }

    pub fn get(&self, id: &str) -> Option<&StrategyDefinition> {
        self.strategies.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.strategies.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &StrategyId> {
        self.strategies.keys()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
