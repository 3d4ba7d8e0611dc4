//! Property tests for allocation invariants.
//!
//! Uses proptest to verify:
//! 1. Optimizer output respects per-instrument bounds and the leverage cap,
//!    with uncorrelated and equicorrelated covariances
//! 2. Long-only constraints never produce a negative weight
//! 3. Projection is idempotent on feasible points
//! 4. Sized positions never exceed the cap in force

use std::collections::BTreeMap;

use proptest::prelude::*;

use stratlab_alloc::linalg::{Matrix, Vector};
use stratlab_alloc::optimizer::project;
use stratlab_alloc::{
    MeanVarianceOptimizer, OptimizationConstraints, OptimizerConfig, PositionSizer,
    SizingConfig, SizingInput, WeightBounds,
};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_problem() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, f64)> {
    (2usize..7).prop_flat_map(|n| {
        (
            prop::collection::vec(-0.2..0.2_f64, n),
            prop::collection::vec(0.05..0.6_f64, n),
            prop_oneof![Just(0.0), 0.0..0.95_f64],
        )
    })
}

/// Σᵢⱼ = ρ σᵢ σⱼ off the diagonal, σᵢ² on it.
fn equicorrelated(vols: &[f64], rho: f64) -> Matrix {
    Matrix::from_shape_fn((vols.len(), vols.len()), |(i, j)| {
        let corr = if i == j { 1.0 } else { rho };
        corr * vols[i] * vols[j]
    })
}

fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("A{i}")).collect()
}

// ── Optimizer ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn weights_respect_bounds_and_leverage(
        (mu, vols, rho) in arb_problem(),
        lo in -0.5..0.0_f64,
        hi in 0.1..1.0_f64,
        leverage in 0.5..2.0_f64,
        long_only in any::<bool>(),
    ) {
        let instruments = ids(mu.len());
        let constraints = OptimizationConstraints {
            default_bounds: WeightBounds::new(lo, hi),
            overrides: BTreeMap::new(),
            max_leverage: leverage,
            long_only,
        };
        let optimizer = MeanVarianceOptimizer::new(OptimizerConfig {
            max_iterations: 2_000,
            ..OptimizerConfig::default()
        })
        .unwrap();
        let result = optimizer
            .optimize(&instruments, &Vector::from(mu), &equicorrelated(&vols, rho), &constraints, None)
            .unwrap();

        prop_assert_eq!(result.weights.len(), instruments.len());
        prop_assert!(result.weights.gross_exposure() <= leverage + 1e-9);
        for (_, &w) in result.weights.iter() {
            prop_assert!(w <= hi + 1e-12);
            prop_assert!(w >= lo - 1e-12);
            if long_only {
                prop_assert!(w >= 0.0);
            }
        }
    }

    #[test]
    fn projection_is_idempotent(
        v in prop::collection::vec(-1.0..1.0_f64, 1..8),
        leverage in 0.2..3.0_f64,
    ) {
        let bounds = vec![WeightBounds::new(-0.8, 0.8); v.len()];
        let once = project(&Vector::from(v), &bounds, leverage);
        let twice = project(&once, &bounds, leverage);
        for (a, b) in once.iter().zip(&twice) {
            prop_assert!((a - b).abs() < 1e-9);
        }
    }
}

// ── Sizing ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sized_positions_stay_within_cap(
        weight in -1.0..1.0_f64,
        volatility in 0.01..1.0_f64,
        conviction in 0.0..=1.0_f64,
    ) {
        let config = SizingConfig::default();
        let hard_cap = config.max_position * (1.0 + config.override_margin);
        let sizer = PositionSizer::new(config).unwrap();
        let result = sizer
            .size_positions(
                &[SizingInput {
                    instrument: "X".into(),
                    weight,
                    volatility,
                    expected_edge: 0.0,
                    conviction,
                }],
                None,
            )
            .unwrap();
        let p = result.get("X").unwrap();
        prop_assert!(p.size.abs() <= p.cap);
        prop_assert!(p.size.abs() <= hard_cap + 1e-12);
        prop_assert!(p.size == 0.0 || p.size.signum() == weight.signum());
    }
}
