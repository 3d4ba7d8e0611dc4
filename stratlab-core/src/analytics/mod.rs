//! Analytics suite — pure functions over per-period return series.
//!
//! Every function handles degenerate input (empty series, zero variance) by
//! returning a neutral 0.0 rather than NaN or infinity.

pub mod bootstrap;
pub mod deflated;
pub mod metrics;
pub mod tail;

pub use bootstrap::{bootstrap_sharpe, BootstrapConfig, BootstrapResult, ConfidenceGrade};
pub use deflated::{
    deflated_sharpe_from_returns, deflated_sharpe_ratio, expected_max_sharpe, DeflatedSharpe,
    EULER_MASCHERONI,
};
pub use metrics::{
    annualized_volatility, cagr, calmar_ratio, drawdown_series, growth_index, information_ratio,
    max_drawdown, rolling_sharpe, sharpe_ratio, sortino_ratio, tail_ratio, total_return,
    turnover, win_rate, PerformanceMetrics,
};
pub use tail::{compute_tail_metrics, TailMetrics};
