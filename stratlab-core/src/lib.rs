//! StratLab Core — strategy evaluation engine.
//!
//! This crate provides:
//! - Dated return series, signal sequences and equity curves
//! - Per-instrument transaction cost schedules
//! - Single-strategy and weighted multi-strategy backtests
//! - Walk-forward validation with an overfit ratio
//! - Risk-adjusted metrics, deflated Sharpe, block bootstrap, tail statistics
//! - Tearsheet assembly with JSON export

pub mod analytics;
pub mod config;
pub mod costs;
pub mod domain;
pub mod engine;
pub mod stats;
pub mod tearsheet;
pub mod walk_forward;

pub use analytics::{
    BootstrapConfig, BootstrapResult, ConfidenceGrade, DeflatedSharpe, PerformanceMetrics,
    TailMetrics,
};
pub use config::{AnalyticsConfig, BacktestConfig, ConfigError, CoreConfig};
pub use costs::{CostError, CostSchedule, CostScheduleConfig};
pub use domain::{
    Direction, EquityCurve, EquityPoint, InstrumentId, ReturnSeries, SeriesError, SeriesPoint,
    Signal, SignalSeries, StrategyId,
};
pub use engine::{
    BacktestEngine, BacktestError, BacktestResult, CorrelationMatrix, MarketData,
    PortfolioResult, StrategyRegistry,
};
pub use stats::TTestResult;
pub use tearsheet::{TearSheet, TearSheetError, TradeStats};
pub use walk_forward::{
    create_windows, run_walk_forward, OverfitFlag, PartialWindowPolicy, WalkForwardConfig,
    WalkForwardError, WalkForwardResult, Window, WindowMode,
};
