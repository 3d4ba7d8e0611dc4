//! StratLab Alloc — from strategy returns to sized positions.
//!
//! This crate provides:
//! - A Black-Litterman prior with regime-scaled view confidence
//! - A constrained mean-variance optimizer with fallback weights
//! - Rebalance triggers on signal change and weight drift
//! - Position sizing by volatility target, fractional Kelly or risk budget

pub mod config;
pub mod linalg;
pub mod optimizer;
pub mod prior;
pub mod rebalance;
pub mod sizing;

pub use config::{AllocConfig, ConfigError};
pub use linalg::{Matrix, Vector};
pub use optimizer::{
    FallbackPolicy, MeanVarianceOptimizer, OptimizationConstraints, OptimizationResult,
    OptimizerConfig, OptimizerError, TargetWeights, WeightBounds,
};
pub use prior::{black_litterman, MarketPrior, Posterior, PriorConfig, PriorError, Regime, View};
pub use rebalance::{rebalance_triggers, should_rebalance, RebalanceConfig, RebalanceTrigger};
pub use sizing::{
    InstrumentRisk, PositionSizeResult, PositionSizer, SizedPosition, SizingConfig, SizingError,
    SizingInput, SizingMethod,
};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn allocators_are_send_sync() {
        assert_send::<MeanVarianceOptimizer>();
        assert_sync::<MeanVarianceOptimizer>();
        assert_send::<PositionSizer>();
        assert_sync::<PositionSizer>();
        assert_send::<MarketPrior>();
        assert_sync::<MarketPrior>();
    }

    #[test]
    fn results_are_send_sync() {
        assert_send::<Posterior>();
        assert_sync::<Posterior>();
        assert_send::<OptimizationResult>();
        assert_sync::<OptimizationResult>();
        assert_send::<PositionSizeResult>();
        assert_sync::<PositionSizeResult>();
        assert_send::<RebalanceTrigger>();
        assert_sync::<RebalanceTrigger>();
    }

    #[test]
    fn config_and_errors_are_send_sync() {
        assert_send::<AllocConfig>();
        assert_sync::<AllocConfig>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
        assert_send::<SizingError>();
        assert_sync::<SizingError>();
    }
}
