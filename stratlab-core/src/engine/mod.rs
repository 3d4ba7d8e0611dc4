//! Backtest engine — single-strategy replay and weighted portfolio runs.
//!
//! `run_single` replays one signal sequence over one return series.
//! `run_portfolio` replays every weighted strategy from a `StrategyRegistry`,
//! aligns the equity curves on the union of their dates and combines them.

pub mod portfolio;
pub mod registry;
pub mod result;
pub mod simulate;

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::analytics::{turnover, PerformanceMetrics};
use crate::config::{BacktestConfig, ConfigError, CoreConfig};
use crate::costs::CostSchedule;
use crate::domain::{EquityCurve, InstrumentId, ReturnSeries, SeriesError, SignalSeries, StrategyId};

pub use registry::{StrategyDefinition, StrategyRegistry};
pub use result::{BacktestResult, CorrelationMatrix, PortfolioResult};
pub use simulate::{simulate, SimulationPath};

/// Per-instrument return series supplied by the caller.
pub type MarketData = BTreeMap<InstrumentId, ReturnSeries>;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("portfolio has no strategies")]
    EmptyPortfolio,
    #[error("strategy '{0}' is not registered")]
    UnknownStrategy(StrategyId),
    #[error("strategy '{0}' appears more than once")]
    DuplicateStrategy(StrategyId),
    #[error("weight for strategy '{strategy}' must be finite, got {weight}")]
    NonFiniteWeight { strategy: StrategyId, weight: f64 },
    #[error("no return series for instrument '{instrument}' (strategy '{strategy}')")]
    MissingMarketData {
        strategy: StrategyId,
        instrument: InstrumentId,
    },
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Stateless engine holding simulation settings and a cost schedule.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: BacktestConfig,
    costs: CostSchedule,
    fingerprint: Option<String>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, costs: CostSchedule) -> Self {
        Self {
            config,
            costs,
            fingerprint: None,
        }
    }

    /// Build from a validated `CoreConfig`; results carry its fingerprint.
    pub fn from_config(config: &CoreConfig) -> Result<Self, BacktestError> {
        config.validate()?;
        Ok(Self {
            config: config.backtest.clone(),
            costs: config.cost_schedule()?,
            fingerprint: Some(config.fingerprint()),
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn costs(&self) -> &CostSchedule {
        &self.costs
    }

    /// Replay one signal sequence over one instrument's returns.
    pub fn run_single(
        &self,
        instrument: &str,
        signals: &SignalSeries,
        market: &ReturnSeries,
    ) -> BacktestResult {
        let cost_bps = self.costs.cost_bps(instrument);
        let path = simulate(
            market,
            signals,
            self.costs.side_fraction(instrument),
            self.config.scale_by_conviction,
        );
        let metrics =
            PerformanceMetrics::compute(&path.returns, &path.exposures, path.trade_count, &self.config);
        debug!(
            instrument,
            periods = path.returns.len(),
            trades = path.trade_count,
            sharpe = metrics.sharpe,
            "single-strategy run complete"
        );
        BacktestResult {
            strategy_id: None,
            instrument: instrument.to_string(),
            equity_curve: EquityCurve::from_returns(&market.dates(), &path.returns),
            returns: path.returns,
            exposures: path.exposures,
            costs: path.costs,
            metrics,
            cost_bps,
            config_fingerprint: self.fingerprint.clone(),
        }
    }

    /// Run every weighted strategy and combine them as Σ wᵢ·eᵢ.
    ///
    /// Weights are applied as given (no normalization). Strategy ids must be
    /// registered and unique, and each strategy's instrument must be in
    /// `market`.
    pub fn run_portfolio(
        &self,
        registry: &StrategyRegistry,
        weights: &[(StrategyId, f64)],
        market: &MarketData,
    ) -> Result<PortfolioResult, BacktestError> {
        let jobs = self.resolve_jobs(registry, weights, market)?;

        let run = |(id, weight, def, series): &(StrategyId, f64, &StrategyDefinition, &ReturnSeries)| {
            let mut result = self.run_single(&def.instrument, &def.signals, series);
            result.strategy_id = Some(id.clone());
            (id.clone(), (*weight, result))
        };
        let runs: BTreeMap<StrategyId, (f64, BacktestResult)> = if self.config.parallel {
            jobs.par_iter().map(run).collect()
        } else {
            jobs.iter().map(run).collect()
        };

        let dates = portfolio::union_dates(runs.values().map(|(_, r)| &r.equity_curve));
        let aligned: BTreeMap<StrategyId, Vec<f64>> = runs
            .iter()
            .map(|(id, (_, r))| (id.clone(), portfolio::align_curve(&r.equity_curve, &dates)))
            .collect();

        let weighted: Vec<(f64, &[f64])> = runs
            .iter()
            .map(|(id, (w, _))| (*w, aligned[id].as_slice()))
            .collect();
        let equity_curve = portfolio::combine(&dates, &weighted);
        let returns = portfolio::returns_from_cumulative(&equity_curve.cumulative_returns());

        let attribution: BTreeMap<StrategyId, f64> = runs
            .iter()
            .map(|(id, (w, r))| (id.clone(), w * r.equity_curve.final_return()))
            .collect();

        let aligned_returns: BTreeMap<StrategyId, Vec<f64>> = aligned
            .iter()
            .map(|(id, cum)| (id.clone(), portfolio::returns_from_cumulative(cum)))
            .collect();
        let correlation = portfolio::correlation_matrix(&aligned_returns);

        let trade_count = runs.values().map(|(_, r)| r.metrics.trade_count).sum();
        let mut metrics = PerformanceMetrics::compute(&returns, &[], trade_count, &self.config);
        metrics.turnover = runs
            .values()
            .map(|(w, r)| w.abs() * turnover(&r.exposures))
            .sum();

        info!(
            strategies = runs.len(),
            periods = dates.len(),
            total_return = equity_curve.final_return(),
            sharpe = metrics.sharpe,
            "portfolio run complete"
        );

        let mut weight_map = BTreeMap::new();
        let mut strategies = BTreeMap::new();
        for (id, (w, r)) in runs {
            weight_map.insert(id.clone(), w);
            strategies.insert(id, r);
        }

        Ok(PortfolioResult {
            equity_curve,
            returns,
            metrics,
            weights: weight_map,
            attribution,
            aligned_curves: aligned,
            correlation,
            strategies,
            config_fingerprint: self.fingerprint.clone(),
        })
    }

    fn resolve_jobs<'a>(
        &self,
        registry: &'a StrategyRegistry,
        weights: &[(StrategyId, f64)],
        market: &'a MarketData,
    ) -> Result<Vec<(StrategyId, f64, &'a StrategyDefinition, &'a ReturnSeries)>, BacktestError> {
        if weights.is_empty() {
            return Err(BacktestError::EmptyPortfolio);
        }
        let mut seen = BTreeSet::new();
        let mut jobs = Vec::with_capacity(weights.len());
        for (id, weight) in weights {
            if !seen.insert(id.as_str()) {
                return Err(BacktestError::DuplicateStrategy(id.clone()));
            }
            if !weight.is_finite() {
                return Err(BacktestError::NonFiniteWeight {
                    strategy: id.clone(),
                    weight: *weight,
                });
            }
            let def = registry
                .get(id)
                .ok_or_else(|| BacktestError::UnknownStrategy(id.clone()))?;
            let series = market.get(&def.instrument).ok_or_else(|| {
                BacktestError::MissingMarketData {
                    strategy: id.clone(),
                    instrument: def.instrument.clone(),
                }
            })?;
            jobs.push((id.clone(), *weight, def, series));
        }
        Ok(jobs)
    }
}

impl Default for BacktestEngine {
    fn default() -> Self {
        Self::new(BacktestConfig::default(), CostSchedule::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn series(values: &[f64], offset: i64) -> ReturnSeries {
        ReturnSeries::from_pairs(
            values
                .iter()
                .enumerate()
                .map(|(i, &v)| (start() + Duration::days(offset + i as i64 + 1), v)),
        )
        .unwrap()
    }

    fn always_long() -> SignalSeries {
        SignalSeries::new(vec![Signal::long(start())]).unwrap()
    }

    #[test]
    fn constant_positive_return_grows_monotonically() {
        let engine = BacktestEngine::default();
        let market = series(&[0.001; 50], 0);
        let signals = SignalSeries::new(vec![Signal::long(start() + Duration::days(1))]).unwrap();
        let result = engine.run_single("SPY", &signals, &market);

        let cum = result.equity_curve.cumulative_returns();
        assert!(cum.windows(2).all(|w| w[1] >= w[0]));
        assert!(cum[2..].windows(2).all(|w| w[1] > w[0]));
        assert!(result.metrics.sharpe > 0.0);
        assert_eq!(result.metrics.trade_count, 1);
    }

    #[test]
    fn costs_reduce_returns() {
        let market = series(&[0.01, -0.01, 0.01, -0.01], 0);
        let signals = SignalSeries::new(vec![
            Signal::long(start()),
            Signal::short(start() + Duration::days(2)),
            Signal::long(start() + Duration::days(3)),
        ])
        .unwrap();
        let free = BacktestEngine::default().run_single("SPY", &signals, &market);
        let costly = BacktestEngine::new(
            BacktestConfig::default(),
            CostSchedule::flat(10.0).unwrap(),
        )
        .run_single("SPY", &signals, &market);
        assert!(costly.equity_curve.final_return() < free.equity_curve.final_return());
        assert_eq!(costly.cost_bps, 10.0);
        assert!((costly.total_cost() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn empty_market_is_neutral() {
        let result =
            BacktestEngine::default().run_single("SPY", &always_long(), &ReturnSeries::default());
        assert!(result.equity_curve.is_empty());
        assert_eq!(result.metrics.sharpe, 0.0);
        assert_eq!(result.metrics.total_return, 0.0);
    }

    #[test]
    fn portfolio_combines_and_attributes() {
        let registry = StrategyRegistry::new()
            .with("a", "SPY", always_long())
            .with("b", "QQQ", always_long());
        let mut market = MarketData::new();
        market.insert("SPY".into(), series(&[0.01, 0.02, -0.01, 0.005], 0));
        market.insert("QQQ".into(), series(&[0.03, -0.02, 0.01], 2));

        let weights = vec![("a".to_string(), 0.6), ("b".to_string(), 0.4)];
        let result = BacktestEngine::default()
            .run_portfolio(&registry, &weights, &market)
            .unwrap();

        // Union of day offsets 1..=4 and 3..=5.
        assert_eq!(result.equity_curve.len(), 5);
        let combined = result.equity_curve.cumulative_returns();
        for (t, c) in combined.iter().enumerate() {
            let expected =
                0.6 * result.aligned_curves["a"][t] + 0.4 * result.aligned_curves["b"][t];
            assert!((c - expected).abs() < 1e-12);
        }
        assert!((result.attribution_total() - result.total_weighted_return()).abs() < 1e-12);
        assert_eq!(result.correlation.ids, vec!["a", "b"]);
        assert_eq!(result.strategies["a"].strategy_id.as_deref(), Some("a"));
    }

    #[test]
    fn parallel_matches_sequential() {
        let registry = StrategyRegistry::new()
            .with("a", "SPY", always_long())
            .with("b", "SPY", SignalSeries::new(vec![Signal::short(start())]).unwrap());
        let mut market = MarketData::new();
        market.insert("SPY".into(), series(&[0.01, -0.02, 0.015, 0.0, 0.004], 0));
        let weights = vec![("a".to_string(), 0.5), ("b".to_string(), 0.5)];

        let seq = BacktestEngine::default()
            .run_portfolio(&registry, &weights, &market)
            .unwrap();
        let config = BacktestConfig {
            parallel: true,
            ..BacktestConfig::default()
        };
        let par = BacktestEngine::new(config, CostSchedule::default())
            .run_portfolio(&registry, &weights, &market)
            .unwrap();
        assert_eq!(seq.equity_curve, par.equity_curve);
        assert_eq!(seq.attribution, par.attribution);
    }

    #[test]
    fn portfolio_rejects_bad_inputs() {
        let registry = StrategyRegistry::new().with("a", "SPY", always_long());
        let mut market = MarketData::new();
        market.insert("SPY".into(), series(&[0.01], 0));
        let engine = BacktestEngine::default();

        assert!(matches!(
            engine.run_portfolio(&registry, &[], &market),
            Err(BacktestError::EmptyPortfolio)
        ));
        assert!(matches!(
            engine.run_portfolio(&registry, &[("zzz".into(), 1.0)], &market),
            Err(BacktestError::UnknownStrategy(id)) if id == "zzz"
        ));
        assert!(matches!(
            engine.run_portfolio(&registry, &[("a".into(), 0.5), ("a".into(), 0.5)], &market),
            Err(BacktestError::DuplicateStrategy(_))
        ));
        assert!(matches!(
            engine.run_portfolio(&registry, &[("a".into(), f64::NAN)], &market),
            Err(BacktestError::NonFiniteWeight { .. })
        ));
        assert!(matches!(
            engine.run_portfolio(&registry, &[("a".into(), 1.0)], &MarketData::new()),
            Err(BacktestError::MissingMarketData { .. })
        ));
    }

    #[test]
    fn from_config_carries_fingerprint() {
        let config = CoreConfig::default();
        let engine = BacktestEngine::from_config(&config).unwrap();
        let result = engine.run_single("SPY", &always_long(), &series(&[0.01, 0.02], 0));
        assert_eq!(result.config_fingerprint, Some(config.fingerprint()));
    }
}
