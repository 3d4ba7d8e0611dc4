//! Allocation configuration, loaded from TOML. Every section is optional.
//!
//! ```toml
//! [prior]
//! tau = 0.05
//!
//! [optimizer]
//! risk_aversion = 3.0
//! fallback = "previous_weights"
//!
//! [rebalance]
//! drift_threshold = 0.05
//!
//! [sizing]
//! default_method = "volatility_target"
//! [sizing.per_instrument]
//! BTC = "fractional_kelly"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::optimizer::{OptimizerConfig, OptimizerError};
use crate::prior::{PriorConfig, PriorError};
use crate::rebalance::RebalanceConfig;
use crate::sizing::{SizingConfig, SizingError};

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
    Prior(#[from] PriorError),
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
    #[error(transparent)]
    Sizing(#[from] SizingError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocConfig {
    pub prior: PriorConfig,
    pub optimizer: OptimizerConfig,
    pub rebalance: RebalanceConfig,
    pub sizing: SizingConfig,
}

impl AllocConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: AllocConfig = toml::from_str(s)?;
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
        self.prior.validate()?;
        self.optimizer.validate()?;
        self.sizing.validate()?;
        let thresholds = [
            ("signal_threshold", self.rebalance.signal_threshold),
            ("drift_threshold", self.rebalance.drift_threshold),
        ];
        for (name, value) in thresholds {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "rebalance.{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::FallbackPolicy;
    use crate::sizing::SizingMethod;

    #[test]
    fn empty_document_gives_defaults() {
        assert_eq!(AllocConfig::from_toml_str("").unwrap(), AllocConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = AllocConfig::from_toml_str(
            r#"
            [optimizer]
            risk_aversion = 5.0
            fallback = "previous_weights"

            [rebalance]
            drift_threshold = 0.1

            [sizing.per_instrument]
            BTC = "kelly"
            "#,
        )
        .unwrap();
        assert_eq!(config.optimizer.risk_aversion, 5.0);
        assert_eq!(config.optimizer.fallback, FallbackPolicy::PreviousWeights);
        assert_eq!(config.rebalance.drift_threshold, 0.1);
        assert_eq!(config.rebalance.signal_threshold, 0.15);
        assert_eq!(
            config.sizing.per_instrument["BTC"].parse::<SizingMethod>().unwrap(),
            SizingMethod::FractionalKelly
        );
    }

    #[test]
    fn unknown_sizing_method_rejected() {
        let err = AllocConfig::from_toml_str(
            r#"
            [sizing]
            default_method = "all_in"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Sizing(SizingError::UnknownMethod(_))));
    }

    #[test]
    fn negative_threshold_rejected() {
        let err = AllocConfig::from_toml_str("[rebalance]\nsignal_threshold = -0.1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn invalid_prior_rejected() {
        let err = AllocConfig::from_toml_str("[prior]\ntau = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Prior(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = AllocConfig::load("/nonexistent/alloc.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
