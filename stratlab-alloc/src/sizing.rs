//! Position sizing — target weights and risk budgets into capped sizes.
//!
//! Three rules, selectable globally or per instrument:
//!
//! ```text
//! volatility target:  raw = w · σ_target / σᵢ
//! fractional Kelly:   raw = f · edgeᵢ / σᵢ²
//! risk budget:        raw = w · budgetᵢ / |crcᵢ|
//! ```
//!
//! The raw size is then capped at `max_position`. When conviction exceeds
//! the threshold the cap is relaxed by the override margin; whether the
//! override applies is decided on the raw size.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use stratlab_core::stats::ZERO_VARIANCE_EPS;
use stratlab_core::InstrumentId;

use crate::optimizer::TargetWeights;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    #[error("unsupported sizing method '{0}'")]
    UnknownMethod(String),
    #[error("risk-budget sizing for '{0}' needs a component risk contribution")]
    MissingRiskContribution(InstrumentId),
    #[error("no volatility/edge inputs for '{0}'")]
    MissingRiskInput(InstrumentId),
    #[error("invalid sizing input for '{instrument}': {reason}")]
    InvalidInput {
        instrument: InstrumentId,
        reason: String,
    },
    #[error("invalid sizing parameter: {0}")]
    InvalidParameter(String),
}

// ─── Methods ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    VolatilityTarget,
    FractionalKelly,
    RiskBudget,
}

impl FromStr for SizingMethod {
    type Err = SizingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "volatility_target" | "vol_target" => Ok(SizingMethod::VolatilityTarget),
            "fractional_kelly" | "kelly" => Ok(SizingMethod::FractionalKelly),
            "risk_budget" => Ok(SizingMethod::RiskBudget),
            _ => Err(SizingError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for SizingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SizingMethod::VolatilityTarget => "volatility_target",
            SizingMethod::FractionalKelly => "fractional_kelly",
            SizingMethod::RiskBudget => "risk_budget",
        };
        f.write_str(name)
    }
}

/// Per-instrument inputs to a sizing rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingInput {
    pub instrument: InstrumentId,
    /// Target weight from the optimizer.
    pub weight: f64,
    /// Annualized volatility σᵢ.
    pub volatility: f64,
    /// Expected edge (excess return) for Kelly sizing.
    pub expected_edge: f64,
    /// Signal conviction in [0, 1].
    pub conviction: f64,
}

/// Volatility, edge and conviction for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRisk {
    pub volatility: f64,
    pub expected_edge: f64,
    pub conviction: f64,
}

/// Raw (pre-cap) sizing rule.
pub trait Sizer: Send + Sync {
    fn raw_size(&self, input: &SizingInput) -> Result<f64, SizingError>;

    fn method(&self) -> SizingMethod;
}

/// raw = w · σ_target / σᵢ; 0.0 when σᵢ is not positive.
#[derive(Debug, Clone)]
pub struct VolatilityTargetSizer {
    pub target_volatility: f64,
}

impl Sizer for VolatilityTargetSizer {
    fn raw_size(&self, input: &SizingInput) -> Result<f64, SizingError> {
        if input.volatility <= ZERO_VARIANCE_EPS {
            return Ok(0.0);
        }
        Ok(input.weight * self.target_volatility / input.volatility)
    }

    fn method(&self) -> SizingMethod {
        SizingMethod::VolatilityTarget
    }
}

/// raw = f · edge / σᵢ²; 0.0 when σᵢ is not positive.
#[derive(Debug, Clone)]
pub struct FractionalKellySizer {
    pub fraction: f64,
}

impl Sizer for FractionalKellySizer {
    fn raw_size(&self, input: &SizingInput) -> Result<f64, SizingError> {
        let variance = input.volatility * input.volatility;
        if input.volatility <= 0.0 || variance <= ZERO_VARIANCE_EPS {
            return Ok(0.0);
        }
        Ok(self.fraction * input.expected_edge / variance)
    }

    fn method(&self) -> SizingMethod {
        SizingMethod::FractionalKelly
    }
}

/// raw = w · budgetᵢ / |crcᵢ|. A zero contribution leaves the weight as is.
#[derive(Debug, Clone)]
pub struct RiskBudgetSizer<'a> {
    pub budgets: &'a BTreeMap<InstrumentId, f64>,
    pub default_budget: f64,
    pub contributions: Option<&'a BTreeMap<InstrumentId, f64>>,
}

impl Sizer for RiskBudgetSizer<'_> {
    fn raw_size(&self, input: &SizingInput) -> Result<f64, SizingError> {
        let crc = self
            .contributions
            .and_then(|c| c.get(&input.instrument))
            .copied()
            .filter(|c| c.is_finite())
            .ok_or_else(|| SizingError::MissingRiskContribution(input.instrument.clone()))?;
        if crc.abs() <= ZERO_VARIANCE_EPS {
            return Ok(input.weight);
        }
        let budget = self
            .budgets
            .get(&input.instrument)
            .copied()
            .unwrap_or(self.default_budget);
        Ok(input.weight * budget / crc.abs())
    }

    fn method(&self) -> SizingMethod {
        SizingMethod::RiskBudget
    }
}

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Method name used when an instrument has no override.
    pub default_method: String,
    /// Instrument → method name.
    pub per_instrument: BTreeMap<InstrumentId, String>,
    /// σ_target for volatility targeting (default 0.10).
    pub target_volatility: f64,
    /// f for fractional Kelly (default 0.5, half-Kelly).
    pub kelly_fraction: f64,
    /// Hard cap on |size| (default 0.25).
    pub max_position: f64,
    /// Conviction above this relaxes the cap (default 0.8).
    pub conviction_threshold: f64,
    /// Relative cap relaxation when the override applies (default 0.2).
    pub override_margin: f64,
    /// Instrument → risk budget; unlisted instruments get 1/N.
    pub risk_budgets: BTreeMap<InstrumentId, f64>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            default_method: SizingMethod::VolatilityTarget.to_string(),
            per_instrument: BTreeMap::new(),
            target_volatility: 0.10,
            kelly_fraction: 0.5,
            max_position: 0.25,
            conviction_threshold: 0.8,
            override_margin: 0.2,
            risk_budgets: BTreeMap::new(),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), SizingError> {
        self.default_method.parse::<SizingMethod>()?;
        for method in self.per_instrument.values() {
            method.parse::<SizingMethod>()?;
        }
        let positive = [
            ("target_volatility", self.target_volatility),
            ("max_position", self.max_position),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(SizingError::InvalidParameter(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.kelly_fraction > 0.0 && self.kelly_fraction <= 1.0) {
            return Err(SizingError::InvalidParameter(format!(
                "kelly_fraction must be in (0, 1], got {}",
                self.kelly_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.conviction_threshold) {
            return Err(SizingError::InvalidParameter(format!(
                "conviction_threshold must be in [0, 1], got {}",
                self.conviction_threshold
            )));
        }
        if !(self.override_margin.is_finite() && self.override_margin >= 0.0) {
            return Err(SizingError::InvalidParameter(format!(
                "override_margin must be non-negative, got {}",
                self.override_margin
            )));
        }
        if let Some((id, b)) = self
            .risk_budgets
            .iter()
            .find(|(_, b)| !(b.is_finite() && **b >= 0.0))
        {
            return Err(SizingError::InvalidParameter(format!(
                "risk budget for '{id}' must be non-negative, got {b}"
            )));
        }
        Ok(())
    }
}

// ─── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizedPosition {
    /// Final signed size after the cap.
    pub size: f64,
    pub raw_size: f64,
    pub method: SizingMethod,
    /// Cap in force for this instrument (relaxed when conviction is high).
    pub cap: f64,
    pub capped: bool,
    /// The relaxed cap let this position exceed `max_position`.
    pub override_applied: bool,
}

/// Instrument → sized position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSizeResult(pub BTreeMap<InstrumentId, SizedPosition>);

impl PositionSizeResult {
    pub fn size(&self, instrument: &str) -> f64 {
        self.0.get(instrument).map_or(0.0, |p| p.size)
    }

    pub fn get(&self, instrument: &str) -> Option<&SizedPosition> {
        self.0.get(instrument)
    }

    pub fn gross_exposure(&self) -> f64 {
        self.0.values().map(|p| p.size.abs()).sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ─── Sizer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizingConfig,
    default_method: SizingMethod,
    overrides: BTreeMap<InstrumentId, SizingMethod>,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Result<Self, SizingError> {
        config.validate()?;
        let default_method = config.default_method.parse::<SizingMethod>()?;
        let overrides = config
            .per_instrument
            .iter()
            .map(|(id, name)| Ok((id.clone(), name.parse::<SizingMethod>()?)))
            .collect::<Result<BTreeMap<_, _>, SizingError>>()?;
        Ok(Self {
            config,
            default_method,
            overrides,
        })
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    pub fn method_for(&self, instrument: &str) -> SizingMethod {
        self.overrides
            .get(instrument)
            .copied()
            .unwrap_or(self.default_method)
    }

    /// Size every input. `risk_contributions` is required for instruments
    /// using the risk-budget method.
    pub fn size_positions(
        &self,
        inputs: &[SizingInput],
        risk_contributions: Option<&BTreeMap<InstrumentId, f64>>,
    ) -> Result<PositionSizeResult, SizingError> {
        let vol_target = VolatilityTargetSizer {
            target_volatility: self.config.target_volatility,
        };
        let kelly = FractionalKellySizer {
            fraction: self.config.kelly_fraction,
        };
        // Default budget is 1/N over the risk-budget instruments only.
        let budgeted = inputs
            .iter()
            .filter(|i| self.method_for(&i.instrument) == SizingMethod::RiskBudget)
            .count();
        let risk_budget = RiskBudgetSizer {
            budgets: &self.config.risk_budgets,
            default_budget: if budgeted == 0 {
                0.0
            } else {
                1.0 / budgeted as f64
            },
            contributions: risk_contributions,
        };

        let mut out = BTreeMap::new();
        for input in inputs {
            check_input(input)?;
            let rule: &dyn Sizer = match self.method_for(&input.instrument) {
                SizingMethod::VolatilityTarget => &vol_target,
                SizingMethod::FractionalKelly => &kelly,
                SizingMethod::RiskBudget => &risk_budget,
            };
            let raw = rule.raw_size(input)?;
            let position = self.apply_cap(raw, input.conviction, rule.method());
            debug!(
                instrument = %input.instrument,
                method = %position.method,
                raw = position.raw_size,
                size = position.size,
                override_applied = position.override_applied,
                "position sized"
            );
            out.insert(input.instrument.clone(), position);
        }
        Ok(PositionSizeResult(out))
    }

    /// Size optimizer output using per-instrument volatility, edge and conviction.
    pub fn size_target_weights(
        &self,
        weights: &TargetWeights,
        risk: &BTreeMap<InstrumentId, InstrumentRisk>,
        risk_contributions: Option<&BTreeMap<InstrumentId, f64>>,
    ) -> Result<PositionSizeResult, SizingError> {
        let inputs = weights
            .iter()
            .map(|(id, &weight)| {
                let r = risk
                    .get(id)
                    .ok_or_else(|| SizingError::MissingRiskInput(id.clone()))?;
                Ok(SizingInput {
                    instrument: id.clone(),
                    weight,
                    volatility: r.volatility,
                    expected_edge: r.expected_edge,
                    conviction: r.conviction,
                })
            })
            .collect::<Result<Vec<_>, SizingError>>()?;
        self.size_positions(&inputs, risk_contributions)
    }

    fn apply_cap(&self, raw: f64, conviction: f64, method: SizingMethod) -> SizedPosition {
        let base_cap = self.config.max_position;
        let relaxed = conviction > self.config.conviction_threshold;
        let cap = if relaxed {
            base_cap * (1.0 + self.config.override_margin)
        } else {
            base_cap
        };
        let capped = raw.abs() > cap;
        let size = if capped { cap.copysign(raw) } else { raw };
        SizedPosition {
            size,
            raw_size: raw,
            method,
            cap,
            capped,
            override_applied: relaxed && raw.abs() > base_cap,
        }
    }
}

fn check_input(input: &SizingInput) -> Result<(), SizingError> {
    let invalid = |reason: &str| SizingError::InvalidInput {
        instrument: input.instrument.clone(),
        reason: reason.to_string(),
    };
    if !input.weight.is_finite() || !input.expected_edge.is_finite() {
        return Err(invalid("weight and edge must be finite"));
    }
    if !input.volatility.is_finite() || input.volatility < 0.0 {
        return Err(invalid("volatility must be finite and non-negative"));
    }
    if !(0.0..=1.0).contains(&input.conviction) {
        return Err(invalid("conviction must be in [0, 1]"));
    }
    Ok(())
}
