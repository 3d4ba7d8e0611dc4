//! Constrained mean-variance optimizer.
//!
//! Maximises `μᵀw − (λ/2) wᵀΣw` over the box bounds, the gross leverage ball
//! `Σ|w| ≤ L` and optional long-only constraint. Each iteration takes a
//! gradient step on the quadratic model and projects back onto the feasible
//! set. Non-convergence and non-finite inputs fall back to a projected
//! default portfolio instead of failing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use stratlab_core::InstrumentId;

use crate::linalg::{self, Matrix, Vector};
use crate::prior::Posterior;

/// Bisection steps when solving for the ℓ₁ shrinkage threshold.
const PROJECTION_BISECTION_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    #[error("no instruments to optimize")]
    Empty,
    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("bounds for '{instrument}' are invalid: min {min} > max {max}")]
    InvalidBounds {
        instrument: InstrumentId,
        min: f64,
        max: f64,
    },
    #[error("max leverage must be positive and finite, got {0}")]
    InvalidLeverage(f64),
    #[error("infeasible constraints: bounds force gross exposure {required} > leverage {max_leverage}")]
    InfeasibleConstraints { required: f64, max_leverage: f64 },
    #[error("invalid optimizer config: {0}")]
    InvalidConfig(String),
}

// ─── Configuration ───────────────────────────────────────────────────

/// Portfolio used when the solver cannot produce an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    EqualWeight,
    /// Previous target weights if supplied, otherwise equal weight.
    PreviousWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// λ, variance penalty (default 3.0).
    pub risk_aversion: f64,
    pub max_iterations: usize,
    /// Converged once no weight moves by more than this in one iteration.
    pub tolerance: f64,
    pub fallback: FallbackPolicy,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            risk_aversion: 3.0,
            max_iterations: 10_000,
            tolerance: 1e-9,
            fallback: FallbackPolicy::EqualWeight,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), OptimizerError> {
        if !(self.risk_aversion.is_finite() && self.risk_aversion > 0.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "risk_aversion must be positive, got {}",
                self.risk_aversion
            )));
        }
        if self.max_iterations == 0 {
            return Err(OptimizerError::InvalidConfig("max_iterations must be > 0".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(OptimizerError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Inclusive weight interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub min: f64,
    pub max: f64,
}

impl WeightBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Smallest |w| the interval allows.
    fn min_abs(&self) -> f64 {
        if self.min > 0.0 {
            self.min
        } else if self.max < 0.0 {
            -self.max
        } else {
            0.0
        }
    }
}

/// Constraints passed by value into each solve; never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConstraints {
    pub default_bounds: WeightBounds,
    /// Per-instrument bounds replacing the default.
    pub overrides: BTreeMap<InstrumentId, WeightBounds>,
    /// L, bound on Σ|w|.
    pub max_leverage: f64,
    pub long_only: bool,
}

impl Default for OptimizationConstraints {
    fn default() -> Self {
        Self {
            default_bounds: WeightBounds::new(0.0, 1.0),
            overrides: BTreeMap::new(),
            max_leverage: 1.0,
            long_only: true,
        }
    }
}

impl OptimizationConstraints {
    /// Effective bounds for `instrument`, long-only applied.
    pub fn bounds_for(&self, instrument: &str) -> WeightBounds {
        let b = self
            .overrides
            .get(instrument)
            .copied()
            .unwrap_or(self.default_bounds);
        if self.long_only {
            WeightBounds::new(b.min.max(0.0), b.max)
        } else {
            b
        }
    }

    /// Resolve and check bounds for `instruments`.
    pub fn resolve(&self, instruments: &[InstrumentId]) -> Result<Vec<WeightBounds>, OptimizerError> {
        if !(self.max_leverage.is_finite() && self.max_leverage > 0.0) {
            return Err(OptimizerError::InvalidLeverage(self.max_leverage));
        }
        let bounds: Vec<WeightBounds> = instruments.iter().map(|id| self.bounds_for(id)).collect();
        for (id, b) in instruments.iter().zip(&bounds) {
            if !(b.min.is_finite() && b.max.is_finite()) || b.min > b.max {
                return Err(OptimizerError::InvalidBounds {
                    instrument: id.clone(),
                    min: b.min,
                    max: b.max,
                });
            }
        }
        let required: f64 = bounds.iter().map(WeightBounds::min_abs).sum();
        if required > self.max_leverage {
            return Err(OptimizerError::InfeasibleConstraints {
                required,
                max_leverage: self.max_leverage,
            });
        }
        Ok(bounds)
    }
}

// ─── Results ─────────────────────────────────────────────────────────

/// Instrument → target weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetWeights(pub BTreeMap<InstrumentId, f64>);

impl TargetWeights {
    pub fn get(&self, instrument: &str) -> f64 {
        self.0.get(instrument).copied().unwrap_or(0.0)
    }

    /// Σ|w|.
    pub fn gross_exposure(&self) -> f64 {
        self.0.values().map(|w| w.abs()).sum()
    }

    pub fn net_exposure(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstrumentId, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(InstrumentId, f64)> for TargetWeights {
    fn from_iter<T: IntoIterator<Item = (InstrumentId, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: TargetWeights,
    pub converged: bool,
    pub fallback_used: bool,
    /// The fallback portfolio had to be projected to satisfy the constraints.
    pub truncated: bool,
    pub iterations: usize,
    /// μᵀw − (λ/2) wᵀΣw at the returned weights (0.0 for non-finite inputs).
    pub utility: f64,
}

// ─── Solver ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MeanVarianceOptimizer {
    config: OptimizerConfig,
}

impl MeanVarianceOptimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Solve for target weights.
    ///
    /// Errors only on malformed input (dimensions, bounds, leverage).
    pub fn optimize(
        &self,
        instruments: &[InstrumentId],
        expected_returns: &Vector,
        covariance: &Matrix,
        constraints: &OptimizationConstraints,
        previous: Option<&TargetWeights>,
    ) -> Result<OptimizationResult, OptimizerError> {
        let n = instruments.len();
        if n == 0 {
            return Err(OptimizerError::Empty);
        }
        if expected_returns.len() != n {
            return Err(OptimizerError::DimensionMismatch {
                what: "expected returns",
                expected: n,
                actual: expected_returns.len(),
            });
        }
        if !linalg::is_square(covariance, n) {
            return Err(OptimizerError::DimensionMismatch {
                what: "covariance",
                expected: n,
                actual: covariance.nrows(),
            });
        }
        let bounds = constraints.resolve(instruments)?;
        let leverage = constraints.max_leverage;
        let lambda = self.config.risk_aversion;

        let finite = expected_returns.iter().all(|x| x.is_finite())
            && covariance.iter().all(|x| x.is_finite());
        if !finite {
            warn!("non-finite optimizer input, using fallback weights");
            return Ok(self.fallback(instruments, &bounds, leverage, previous, 0, None));
        }

        let norm = linalg::inf_norm(covariance);
        let step = if norm > 0.0 { 1.0 / (lambda * norm) } else { 1.0 };

        let mut w = project(&Vector::from_elem(n, 1.0 / n as f64), &bounds, leverage);
        for iteration in 1..=self.config.max_iterations {
            // ∇ = μ − λΣw
            let gradient = expected_returns - &(covariance.dot(&w) * lambda);
            let next = project(&(&w + &(gradient * step)), &bounds, leverage);
            let change = (&next - &w).iter().map(|d| d.abs()).fold(0.0, f64::max);
            w = next;
            if change < self.config.tolerance {
                debug!(iterations = iteration, "mean-variance solve converged");
                return Ok(OptimizationResult {
                    utility: utility(&w, expected_returns, covariance, lambda),
                    weights: zip_weights(instruments, &w),
                    converged: true,
                    fallback_used: false,
                    truncated: false,
                    iterations: iteration,
                });
            }
        }

        warn!(
            max_iterations = self.config.max_iterations,
            policy = ?self.config.fallback,
            "mean-variance solve did not converge, using fallback weights"
        );
        Ok(self.fallback(
            instruments,
            &bounds,
            leverage,
            previous,
            self.config.max_iterations,
            Some((expected_returns, covariance)),
        ))
    }

    /// Optimize over a Black-Litterman posterior.
    pub fn optimize_posterior(
        &self,
        posterior: &Posterior,
        constraints: &OptimizationConstraints,
        previous: Option<&TargetWeights>,
    ) -> Result<OptimizationResult, OptimizerError> {
        self.optimize(
            &posterior.instruments,
            &posterior.expected_returns,
            &posterior.covariance,
            constraints,
            previous,
        )
    }

    fn fallback(
        &self,
        instruments: &[InstrumentId],
        bounds: &[WeightBounds],
        leverage: f64,
        previous: Option<&TargetWeights>,
        iterations: usize,
        model: Option<(&Vector, &Matrix)>,
    ) -> OptimizationResult {
        let n = instruments.len();
        let raw: Vector = match (self.config.fallback, previous) {
            (FallbackPolicy::PreviousWeights, Some(prev)) => instruments
                .iter()
                .map(|id| Some(prev.get(id)).filter(|w| w.is_finite()).unwrap_or(0.0))
                .collect(),
            _ => Vector::from_elem(n, 1.0 / n as f64),
        };
        let w = project(&raw, bounds, leverage);
        let truncated = w.iter().zip(raw.iter()).any(|(a, b)| (a - b).abs() > 1e-12);
        OptimizationResult {
            utility: model.map_or(0.0, |(mu, cov)| {
                utility(&w, mu, cov, self.config.risk_aversion)
            }),
            weights: zip_weights(instruments, &w),
            converged: false,
            fallback_used: true,
            truncated,
            iterations,
        }
    }
}

fn zip_weights(instruments: &[InstrumentId], w: &Vector) -> TargetWeights {
    instruments.iter().cloned().zip(w.iter().copied()).collect()
}

fn utility(w: &Vector, mu: &Vector, cov: &Matrix, lambda: f64) -> f64 {
    mu.dot(w) - 0.5 * lambda * linalg::quad_form(cov, w)
}

/// Euclidean projection onto {lo ≤ w ≤ hi} ∩ {Σ|w| ≤ L}.
///
/// The projection is `clip(soft(v, θ))` for the smallest θ ≥ 0 that meets
/// the leverage bound; θ is found by bisection. Requires Σ min|wᵢ| ≤ L.
pub fn project(v: &Vector, bounds: &[WeightBounds], leverage: f64) -> Vector {
    let shrink = |theta: f64| -> Vector {
        v.iter()
            .zip(bounds)
            .map(|(&x, b)| {
                let soft = x.signum() * (x.abs() - theta).max(0.0);
                soft.clamp(b.min, b.max)
            })
            .collect()
    };
    let gross = |w: &Vector| w.iter().map(|x| x.abs()).sum::<f64>();

    let clipped = shrink(0.0);
    if gross(&clipped) <= leverage {
        return clipped;
    }

    let mut lo = 0.0;
    let mut hi = v.iter().map(|x| x.abs()).fold(0.0, f64::max);
    for _ in 0..PROJECTION_BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if gross(&shrink(mid)) <= leverage {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    shrink(hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn ids(n: usize) -> Vec<InstrumentId> {
        (0..n).map(|i| format!("I{i}")).collect()
    }

    fn unconstrained(max_leverage: f64) -> OptimizationConstraints {
        OptimizationConstraints {
            default_bounds: WeightBounds::new(-2.0, 2.0),
            overrides: BTreeMap::new(),
            max_leverage,
            long_only: false,
        }
    }

    fn optimizer(risk_aversion: f64) -> MeanVarianceOptimizer {
        MeanVarianceOptimizer::new(OptimizerConfig {
            risk_aversion,
            ..OptimizerConfig::default()
        })
        .unwrap()
    }

    // ── Solutions ──

    #[test]
    fn interior_solution_matches_closed_form() {
        let cov = array![[0.04, 0.0], [0.0, 0.04]];
        let result = optimizer(2.0)
            .optimize(&ids(2), &array![0.08, 0.04], &cov, &unconstrained(2.0), None)
            .unwrap();
        assert!(result.converged);
        assert!(!result.fallback_used);
        assert!((result.weights.get("I0") - 1.0).abs() < 1e-9);
        assert!((result.weights.get("I1") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn leverage_bound_binds() {
        let cov = array![[0.01, 0.0], [0.0, 0.01]];
        let result = optimizer(1.0)
            .optimize(&ids(2), &array![0.08, 0.08], &cov, &unconstrained(1.0), None)
            .unwrap();
        assert!(result.converged);
        assert!((result.weights.gross_exposure() - 1.0).abs() < 1e-9);
        assert!((result.weights.get("I0") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn long_only_zeroes_negative_edge() {
        let cov = array![[0.04, 0.01], [0.01, 0.09]];
        let constraints = OptimizationConstraints::default();
        let result = optimizer(3.0)
            .optimize(&ids(2), &array![0.10, -0.05], &cov, &constraints, None)
            .unwrap();
        assert!(result.weights.iter().all(|(_, &w)| w >= 0.0));
        assert_eq!(result.weights.get("I1"), 0.0);
    }

    #[test]
    fn override_bounds_apply_per_instrument() {
        let cov = array![[0.04, 0.0], [0.0, 0.04]];
        let mut constraints = unconstrained(3.0);
        constraints
            .overrides
            .insert("I0".into(), WeightBounds::new(0.0, 0.25));
        let result = optimizer(2.0)
            .optimize(&ids(2), &array![0.08, 0.04], &cov, &constraints, None)
            .unwrap();
        assert!(result.weights.get("I0") <= 0.25 + 1e-12);
    }

    // ── Fallbacks ──

    #[test]
    fn non_convergence_falls_back_to_equal_weight() {
        let cov = array![[0.04, 0.018], [0.018, 0.09]];
        let opt = MeanVarianceOptimizer::new(OptimizerConfig {
            max_iterations: 1,
            ..OptimizerConfig::default()
        })
        .unwrap();
        let result = opt
            .optimize(&ids(2), &array![0.12, 0.02], &cov, &OptimizationConstraints::default(), None)
            .unwrap();
        assert!(!result.converged);
        assert!(result.fallback_used);
        assert!(!result.truncated);
        assert_eq!(result.weights.get("I0"), 0.5);
    }

    #[test]
    fn previous_weights_fallback_is_projected() {
        let opt = MeanVarianceOptimizer::new(OptimizerConfig {
            fallback: FallbackPolicy::PreviousWeights,
            ..OptimizerConfig::default()
        })
        .unwrap();
        let previous: TargetWeights = [("I0".to_string(), 0.9), ("I1".to_string(), 0.6)]
            .into_iter()
            .collect();
        let cov = array![[f64::NAN, 0.0], [0.0, 0.04]];
        let result = opt
            .optimize(&ids(2), &array![0.1, 0.1], &cov, &OptimizationConstraints::default(), Some(&previous))
            .unwrap();
        assert!(result.fallback_used);
        assert!(result.truncated);
        assert!(result.weights.gross_exposure() <= 1.0 + 1e-12);
        assert!(result.weights.get("I0") > result.weights.get("I1"));
    }

    #[test]
    fn non_finite_returns_are_not_an_error() {
        let cov = array![[0.04]];
        let result = optimizer(3.0)
            .optimize(&ids(1), &array![f64::INFINITY], &cov, &OptimizationConstraints::default(), None)
            .unwrap();
        assert!(result.fallback_used);
        assert_eq!(result.utility, 0.0);
    }

    // ── Configuration errors ──

    #[test]
    fn infeasible_minimum_exposure_rejected() {
        let constraints = OptimizationConstraints {
            default_bounds: WeightBounds::new(0.3, 0.5),
            overrides: BTreeMap::new(),
            max_leverage: 1.0,
            long_only: true,
        };
        let cov = Array2::eye(4);
        let err = optimizer(3.0)
            .optimize(&ids(4), &Vector::from_elem(4, 0.1), &cov, &constraints, None)
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InfeasibleConstraints { .. }));
    }

    #[test]
    fn inverted_bounds_and_bad_leverage_rejected() {
        let cov = Array2::eye(1);
        let mut constraints = unconstrained(1.0);
        constraints.default_bounds = WeightBounds::new(0.5, 0.1);
        assert!(matches!(
            optimizer(3.0).optimize(&ids(1), &array![0.1], &cov, &constraints, None),
            Err(OptimizerError::InvalidBounds { .. })
        ));
        assert!(matches!(
            optimizer(3.0).optimize(&ids(1), &array![0.1], &cov, &unconstrained(0.0), None),
            Err(OptimizerError::InvalidLeverage(_))
        ));
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let cov = Array2::eye(2);
        assert!(matches!(
            optimizer(3.0).optimize(&ids(2), &array![0.1], &cov, &unconstrained(1.0), None),
            Err(OptimizerError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            optimizer(3.0).optimize(
                &[],
                &Vector::zeros(0),
                &Array2::zeros((0, 0)),
                &unconstrained(1.0),
                None
            ),
            Err(OptimizerError::Empty)
        ));
    }

    // ── Projection ──

    #[test]
    fn projection_respects_box_and_ball() {
        let bounds = vec![WeightBounds::new(-0.5, 0.5); 3];
        let w = project(&array![2.0, -3.0, 0.1], &bounds, 0.8);
        assert!(w.iter().all(|x| (-0.5..=0.5).contains(x)));
        assert!(w.iter().map(|x| x.abs()).sum::<f64>() <= 0.8 + 1e-12);
    }

    #[test]
    fn feasible_point_is_unchanged() {
        let bounds = vec![WeightBounds::new(0.0, 1.0); 2];
        assert_eq!(project(&array![0.3, 0.4], &bounds, 1.0), array![0.3, 0.4]);
    }
}
