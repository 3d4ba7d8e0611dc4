//! Domain types for StratLab: dated series, signals, equity curves.

pub mod equity;
pub mod series;
pub mod signal;

pub use equity::{EquityCurve, EquityPoint};
pub use series::{ReturnSeries, SeriesError, SeriesPoint};
pub use signal::{Direction, Signal, SignalSeries};

/// Instrument identifier alias.
pub type InstrumentId = String;

/// Strategy identifier alias.
pub type StrategyId = String;
