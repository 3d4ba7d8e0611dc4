//! Engine configuration — TOML-loadable, every section optional.
//!
//! ```toml
//! [backtest]
//! periods_per_year = 252.0
//! parallel = true
//!
//! [walk_forward]
//! train_span = 252
//! test_span = 63
//!
//! [costs]
//! default_bps = 5.0
//! [costs.entries]
//! "FX:" = 1.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analytics::BootstrapConfig;
use crate::costs::{CostError, CostSchedule, CostScheduleConfig};
use crate::walk_forward::WalkForwardConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Cost(#[from] CostError),
}

// ─── Sections ────────────────────────────────────────────────────────

/// Simulation settings shared by single and portfolio runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Periods per year used for annualization (default 252).
    pub periods_per_year: f64,
    /// Annual risk-free rate subtracted in the Sharpe ratio (default 0).
    pub risk_free_rate: f64,
    /// Scale exposure by signal conviction (default true).
    pub scale_by_conviction: bool,
    /// Simulate strategies and windows on the rayon pool (default false).
    pub parallel: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
            scale_by_conviction: true,
            parallel: false,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "periods_per_year must be positive, got {}",
                self.periods_per_year
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(ConfigError::Invalid("risk_free_rate must be finite".into()));
        }
        Ok(())
    }
}

/// Tearsheet and metric settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Rolling Sharpe window in periods (default 63).
    pub rolling_window: usize,
    /// Sortino target return per period (default 0).
    pub sortino_target: f64,
    /// Upper percentile for the tail ratio, as a fraction (default 0.95).
    pub tail_percentile: f64,
    /// Histogram bins in the return distribution (default 20).
    pub histogram_bins: usize,
    /// Trials assumed by the deflated Sharpe ratio (default 1).
    pub n_trials: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            rolling_window: 63,
            sortino_target: 0.0,
            tail_percentile: 0.95,
            histogram_bins: 20,
            n_trials: 1,
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rolling_window == 0 {
            return Err(ConfigError::Invalid("rolling_window must be > 0".into()));
        }
        if !(self.tail_percentile > 0.5 && self.tail_percentile < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "tail_percentile must be in (0.5, 1), got {}",
                self.tail_percentile
            )));
        }
        if self.histogram_bins == 0 {
            return Err(ConfigError::Invalid("histogram_bins must be > 0".into()));
        }
        if self.n_trials == 0 {
            return Err(ConfigError::Invalid("n_trials must be >= 1".into()));
        }
        Ok(())
    }
}

// ─── Top level ───────────────────────────────────────────────────────

/// All engine configuration in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub backtest: BacktestConfig,
    pub walk_forward: WalkForwardConfig,
    pub analytics: AnalyticsConfig,
    pub bootstrap: BootstrapConfig,
    pub costs: CostScheduleConfig,
}

impl CoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backtest.validate()?;
        self.analytics.validate()?;
        self.walk_forward
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !(self.bootstrap.confidence > 0.0 && self.bootstrap.confidence < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "bootstrap confidence must be in (0, 1), got {}",
                self.bootstrap.confidence
            )));
        }
        self.cost_schedule()?;
        Ok(())
    }

    /// Build the immutable cost schedule described by `[costs]`.
    pub fn cost_schedule(&self) -> Result<CostSchedule, ConfigError> {
        Ok(CostSchedule::from_config(&self.costs)?)
    }

    /// Content hash of the configuration (blake3 over canonical JSON).
    ///
    /// Identical configs give identical fingerprints; any field change
    /// gives a different one.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config = CoreConfig::from_toml_str(
            r#"
            [backtest]
            parallel = true

            [costs]
            default_bps = 2.5
            [costs.entries]
            "FX:" = 1.0
            "#,
        )
        .unwrap();
        assert!(config.backtest.parallel);
        assert_eq!(config.backtest.periods_per_year, 252.0);
        let schedule = config.cost_schedule().unwrap();
        assert_eq!(schedule.cost_bps("FX:EURUSD"), 1.0);
        assert_eq!(schedule.cost_bps("SPY"), 2.5);
    }

    #[test]
    fn negative_cost_is_rejected() {
        let err = CoreConfig::from_toml_str(
            r#"
            [costs.entries]
            SPY = -1.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Cost(_)));
    }

    #[test]
    fn zero_periods_per_year_is_rejected() {
        let err = CoreConfig::from_toml_str("[backtest]\nperiods_per_year = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = CoreConfig::from_toml_str("[backtest\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = CoreConfig::default();
        let mut b = CoreConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.analytics.rolling_window = 21;
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
