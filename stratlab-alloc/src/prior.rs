//! Black-Litterman allocation prior.
//!
//! ```text
//! π  = δ Σ w_mkt
//! Ω  = diag(ωₖ),  ωₖ = ((1 - cₖ)/cₖ) · pₖ τΣ pₖᵀ
//! M  = [(τΣ)⁻¹ + Pᵀ Ω⁻¹ P]⁻¹
//! μ  = M [(τΣ)⁻¹ π + Pᵀ Ω⁻¹ Q]
//! Σ* = Σ + M
//! ```
//!
//! A numerically singular system falls back to the equilibrium prior with
//! `views_applied = false`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use stratlab_core::InstrumentId;

use ndarray::{Array1, Array2, Axis};

use crate::linalg::{self, Matrix, Vector};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PriorError {
    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("view {index} references unknown instrument '{instrument}'")]
    UnknownInstrument { index: usize, instrument: InstrumentId },
    #[error("view {index} is invalid: {reason}")]
    InvalidView { index: usize, reason: String },
    #[error("invalid prior parameter: {0}")]
    InvalidParameter(String),
    #[error("covariance estimation needs at least 2 observations, got {0}")]
    InsufficientHistory(usize),
}

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// δ, market risk aversion (default 2.5).
    pub risk_aversion: f64,
    /// τ, uncertainty scale of the equilibrium (default 0.05).
    pub tau: f64,
    /// Confidence multiplier in a stable regime (default 1.25).
    pub stable_multiplier: f64,
    /// Confidence multiplier in a transitional regime (default 0.5).
    pub transitional_multiplier: f64,
    /// Confidences are clamped to [min_confidence, max_confidence].
    pub min_confidence: f64,
    pub max_confidence: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 2.5,
            tau: 0.05,
            stable_multiplier: 1.25,
            transitional_multiplier: 0.5,
            min_confidence: 0.01,
            max_confidence: 0.99,
        }
    }
}

impl PriorConfig {
    pub fn validate(&self) -> Result<(), PriorError> {
        let positive = [
            ("risk_aversion", self.risk_aversion),
            ("tau", self.tau),
            ("stable_multiplier", self.stable_multiplier),
            ("transitional_multiplier", self.transitional_multiplier),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PriorError::InvalidParameter(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(0.0 < self.min_confidence
            && self.min_confidence < self.max_confidence
            && self.max_confidence < 1.0)
        {
            return Err(PriorError::InvalidParameter(format!(
                "confidence clamp must satisfy 0 < min < max < 1, got [{}, {}]",
                self.min_confidence, self.max_confidence
            )));
        }
        Ok(())
    }

    fn multiplier(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Stable => self.stable_multiplier,
            Regime::Transitional => self.transitional_multiplier,
        }
    }
}

// ─── Inputs ──────────────────────────────────────────────────────────

/// Market regime supplied by an external classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Stable,
    Transitional,
}

/// One subjective view: a portfolio of instruments (a row of P), its
/// expected return (Q) and a confidence in (0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub weights: BTreeMap<InstrumentId, f64>,
    pub expected_return: f64,
    pub confidence: f64,
}

impl View {
    /// "`instrument` returns `expected_return`."
    pub fn absolute(instrument: impl Into<InstrumentId>, expected_return: f64, confidence: f64) -> Self {
        Self {
            weights: BTreeMap::from([(instrument.into(), 1.0)]),
            expected_return,
            confidence,
        }
    }

    /// "`long` outperforms `short` by `spread`."
    pub fn relative(
        long: impl Into<InstrumentId>,
        short: impl Into<InstrumentId>,
        spread: f64,
        confidence: f64,
    ) -> Self {
        Self {
            weights: BTreeMap::from([(long.into(), 1.0), (short.into(), -1.0)]),
            expected_return: spread,
            confidence,
        }
    }
}

/// Covariance and benchmark weights over an ordered instrument universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrior {
    instruments: Vec<InstrumentId>,
    covariance: Matrix,
    benchmark_weights: Vector,
}

impl MarketPrior {
    pub fn new(
        instruments: Vec<InstrumentId>,
        covariance: Matrix,
        benchmark_weights: Vector,
    ) -> Result<Self, PriorError> {
        let n = instruments.len();
        if covariance.nrows() != n {
            return Err(PriorError::DimensionMismatch {
                what: "covariance rows",
                expected: n,
                actual: covariance.nrows(),
            });
        }
        if covariance.ncols() != n {
            return Err(PriorError::DimensionMismatch {
                what: "covariance columns",
                expected: n,
                actual: covariance.ncols(),
            });
        }
        if benchmark_weights.len() != n {
            return Err(PriorError::DimensionMismatch {
                what: "benchmark weights",
                expected: n,
                actual: benchmark_weights.len(),
            });
        }
        if covariance.iter().chain(benchmark_weights.iter()).any(|x| !x.is_finite()) {
            return Err(PriorError::InvalidParameter(
                "covariance and benchmark weights must be finite".into(),
            ));
        }
        Ok(Self {
            instruments,
            covariance,
            benchmark_weights,
        })
    }

    /// Estimate the covariance from aligned per-instrument returns.
    pub fn from_returns(
        returns: &BTreeMap<InstrumentId, Vec<f64>>,
        benchmark_weights: &BTreeMap<InstrumentId, f64>,
        annualization: f64,
    ) -> Result<Self, PriorError> {
        let instruments: Vec<InstrumentId> = returns.keys().cloned().collect();
        let series: Vec<Vec<f64>> = returns.values().cloned().collect();
        let covariance = sample_covariance(&series)? * annualization;
        let weights = instruments
            .iter()
            .map(|id| benchmark_weights.get(id).copied().unwrap_or(0.0))
            .collect::<Vector>();
        Self::new(instruments, covariance, weights)
    }

    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    pub fn covariance(&self) -> &Matrix {
        &self.covariance
    }

    pub fn benchmark_weights(&self) -> &Vector {
        &self.benchmark_weights
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Blended return and risk estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    pub instruments: Vec<InstrumentId>,
    /// π, the reverse-optimized equilibrium returns.
    pub equilibrium_returns: Vector,
    /// μ, or π when no views were applied.
    pub expected_returns: Vector,
    pub covariance: Matrix,
    /// False when there were no views or the system was singular.
    pub views_applied: bool,
    /// Confidence per view after regime scaling and clamping.
    pub effective_confidences: Vec<f64>,
}

// ─── Estimation ──────────────────────────────────────────────────────

/// π = δ Σ w_mkt.
pub fn equilibrium_returns(prior: &MarketPrior, risk_aversion: f64) -> Vector {
    prior.covariance.dot(&prior.benchmark_weights) * risk_aversion
}

/// Unbiased (n - 1) sample covariance of equal-length return series.
pub fn sample_covariance(series: &[Vec<f64>]) -> Result<Matrix, PriorError> {
    let len = series.first().map_or(0, Vec::len);
    if let Some(bad) = series.iter().find(|s| s.len() != len) {
        return Err(PriorError::DimensionMismatch {
            what: "return series length",
            expected: len,
            actual: bad.len(),
        });
    }
    if series.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }
    if len < 2 {
        return Err(PriorError::InsufficientHistory(len));
    }
    // Observations in rows, instruments in columns.
    let data = Array2::from_shape_fn((len, series.len()), |(t, i)| series[i][t]);
    let means = data
        .mean_axis(Axis(0))
        .ok_or(PriorError::InsufficientHistory(len))?;
    let centered = &data - &means;
    Ok(centered.t().dot(&centered) / (len as f64 - 1.0))
}

/// Effective view confidence: regime-scaled, then clamped.
pub fn effective_confidence(confidence: f64, regime: Option<Regime>, config: &PriorConfig) -> f64 {
    let scaled = match regime {
        Some(r) => confidence * config.multiplier(r),
        None => confidence,
    };
    scaled.clamp(config.min_confidence, config.max_confidence)
}

/// Blend the equilibrium prior with `views`.
pub fn black_litterman(
    prior: &MarketPrior,
    views: &[View],
    regime: Option<Regime>,
    config: &PriorConfig,
) -> Result<Posterior, PriorError> {
    config.validate()?;
    let pi = equilibrium_returns(prior, config.risk_aversion);
    let (pick, q, confidences) = build_views(prior, views, regime, config)?;
    let tau_sigma = &prior.covariance * config.tau;

    let fallback = |confidences: Vec<f64>| Posterior {
        instruments: prior.instruments.clone(),
        equilibrium_returns: pi.clone(),
        expected_returns: pi.clone(),
        covariance: &prior.covariance + &tau_sigma,
        views_applied: false,
        effective_confidences: confidences,
    };

    if views.is_empty() {
        return Ok(fallback(confidences));
    }

    match blend(&pi, &tau_sigma, &pick, &q, &confidences) {
        Some((mu, m)) => {
            debug!(views = views.len(), ?regime, "black-litterman posterior computed");
            Ok(Posterior {
                instruments: prior.instruments.clone(),
                equilibrium_returns: pi.clone(),
                expected_returns: mu,
                covariance: &prior.covariance + &m,
                views_applied: true,
                effective_confidences: confidences,
            })
        }
        None => {
            warn!(views = views.len(), "singular black-litterman system, using equilibrium prior");
            Ok(fallback(confidences))
        }
    }
}

type ViewMatrices = (Matrix, Vector, Vec<f64>);

fn build_views(
    prior: &MarketPrior,
    views: &[View],
    regime: Option<Regime>,
    config: &PriorConfig,
) -> Result<ViewMatrices, PriorError> {
    let mut pick = Array2::zeros((views.len(), prior.len()));
    let mut q = Array1::zeros(views.len());
    let mut confidences = Vec::with_capacity(views.len());

    for (index, view) in views.iter().enumerate() {
        if !(view.confidence > 0.0 && view.confidence <= 1.0) {
            return Err(PriorError::InvalidView {
                index,
                reason: format!("confidence must be in (0, 1], got {}", view.confidence),
            });
        }
        if !view.expected_return.is_finite() {
            return Err(PriorError::InvalidView {
                index,
                reason: "expected return must be finite".into(),
            });
        }
        for (instrument, &w) in &view.weights {
            let col = prior
                .instruments
                .iter()
                .position(|id| id == instrument)
                .ok_or_else(|| PriorError::UnknownInstrument {
                    index,
                    instrument: instrument.clone(),
                })?;
            pick[[index, col]] = w;
        }
        q[index] = view.expected_return;
        confidences.push(effective_confidence(view.confidence, regime, config));
    }
    Ok((pick, q, confidences))
}

/// Posterior mean and M, or `None` if any inverse is singular.
fn blend(
    pi: &Vector,
    tau_sigma: &Matrix,
    pick: &Matrix,
    q: &Vector,
    confidences: &[f64],
) -> Option<(Vector, Matrix)> {
    let omega_inv = pick
        .rows()
        .into_iter()
        .zip(confidences)
        .map(|(p, &c)| {
            let omega = (1.0 - c) / c * p.dot(&tau_sigma.dot(&p));
            (omega.is_finite() && omega > linalg::SINGULAR_EPS).then(|| 1.0 / omega)
        })
        .collect::<Option<Vector>>()?;

    let tau_sigma_inv = linalg::invert(tau_sigma)?;
    // Pᵀ Ω⁻¹: column k of Pᵀ scaled by 1/ωₖ.
    let pt_omega_inv = &pick.t() * &omega_inv;

    let precision = &tau_sigma_inv + &pt_omega_inv.dot(pick);
    let m = linalg::invert(&precision)?;

    let rhs = tau_sigma_inv.dot(pi) + pt_omega_inv.dot(q);
    let mu = m.dot(&rhs);
    if mu.iter().any(|x| !x.is_finite()) {
        return None;
    }
    Some((mu, m))
}
