//! Property-based tests for mixtures, products, and fitting.
//!
//! Uses proptest to verify invariants across many random inputs.

use bp_config::ApproxConfig;
use bp_core::approximation::{
    cross_entropy, cross_product, entropy, fit_mixture, FitOptions, Integrator,
};
use bp_core::distribution::{gaussian_product, SplineDensity};
use bp_core::{Distribution, Gaussian, MessageEngine, MixGaussians};
use bp_math::{normal_pdf, IntervalSet};
use proptest::prelude::*;

fn gaussian_strategy() -> impl Strategy<Value = Gaussian> {
    (-10.0..10.0f64, 0.05..5.0f64).prop_map(|(mu, sigma)| Gaussian::new(mu, sigma).unwrap())
}

fn mixture_strategy(max: usize) -> impl Strategy<Value = MixGaussians> {
    prop::collection::vec((0.01..1.0f64, gaussian_strategy()), 1..=max)
        .prop_map(|components| MixGaussians::new(components).unwrap())
}

/// Spline through a weighted sum of normal densities `(w, mu, sigma)`.
fn tabulated(components: &[(f64, f64, f64)], left: f64, right: f64) -> Distribution {
    let x: Vec<f64> = (0..=480)
        .map(|i| left + (right - left) * i as f64 / 480.0)
        .collect();
    let p: Vec<f64> = x
        .iter()
        .map(|&v| {
            components
                .iter()
                .map(|(w, mu, sigma)| w * normal_pdf(v, *mu, *sigma))
                .sum()
        })
        .collect();
    Distribution::SplineDensity(SplineDensity::new(&x, &p).unwrap())
}

// ============================================================================
// Mixture invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Weights sum to one after construction.
    #[test]
    fn weights_sum_to_one(mix in mixture_strategy(8)) {
        let total: f64 = mix.weights().iter().sum();
        prop_assert!((total - 1.0).abs() < 1e-12);
    }

    /// Responsibilities are a distribution wherever the mixture has mass,
    /// and all zero where it has none.
    #[test]
    fn responsibilities_partition_unity(mix in mixture_strategy(6), x in -50.0..50.0f64) {
        let r = mix.responsibilities(x);
        let total: f64 = r.iter().sum();
        if mix.density(x) > 0.0 {
            prop_assert!((total - 1.0).abs() < 1e-9, "x={x} r={r:?}");
        } else {
            prop_assert!(r.iter().all(|v| *v == 0.0));
        }
    }

    /// Pruning keeps weights normalized.
    #[test]
    fn simplify_keeps_weights_normalized(mix in mixture_strategy(8)) {
        let engine = MessageEngine::default();
        let thresholds = engine.config().similarity.general;
        if let Ok(simple) = mix.simplify(engine.config().fit.min_mix_proportion, &thresholds) {
            let total: f64 = simple.weights().iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-12);
            prop_assert!(simple.len() <= mix.len());
        }
    }
}

// ============================================================================
// Products
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Precisions add and the mean is the precision-weighted average.
    #[test]
    fn gaussian_product_adds_precisions(a in gaussian_strategy(), b in gaussian_strategy()) {
        let p = gaussian_product(&[a, b]).unwrap();
        let precision = 1.0 / a.variance() + 1.0 / b.variance();
        let mean = (a.mu() / a.variance() + b.mu() / b.variance()) / precision;
        prop_assert!((p.variance() - 1.0 / precision).abs() < 1e-9 * (1.0 / precision).max(1.0));
        prop_assert!((p.mu() - mean).abs() < 1e-9 * mean.abs().max(1.0));
    }

    /// One term per combination, weighted by the product of the chosen
    /// components' weights.
    #[test]
    fn mixture_product_enumerates_combinations(
        a in mixture_strategy(4),
        b in mixture_strategy(4),
    ) {
        let product = cross_product(&[a.clone().into(), b.clone().into()], &ApproxConfig::default())
            .unwrap();
        prop_assert_eq!(product.len(), a.len() * b.len());
        for (term, w) in product.terms().iter().zip(product.prior_weights()) {
            let expected = a.components()[term.indices[0]].weight * b.components()[term.indices[1]].weight;
            prop_assert!((w - expected).abs() < 1e-12);
        }
        if let Some(weights) = product.posterior_weights() {
            prop_assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }
}

#[test]
fn standard_normal_product_has_half_variance() {
    let engine = MessageEngine::default();
    let n = Distribution::Gaussian(Gaussian::standard());
    let post = engine.compute_posterior(&n, &n).unwrap();
    assert!(post.mean().unwrap().abs() < 1e-12);
    assert!((post.variance().unwrap() - 0.5).abs() < 1e-12);
}

// ============================================================================
// Fitting
// ============================================================================

#[test]
fn fitting_a_normal_approaches_its_entropy() {
    let target = tabulated(&[(1.0, 0.0, 1.0)], -8.0, 8.0);
    let supports = IntervalSet::single(-8.0, 8.0);
    let seed = MixGaussians::new(vec![
        (1.0 / 3.0, Gaussian::new(0.0, 1.0).unwrap()),
        (1.0 / 3.0, Gaussian::new(-1.0, 1.0).unwrap()),
        (1.0 / 3.0, Gaussian::new(1.0, 1.0).unwrap()),
    ])
    .unwrap();
    let integrator = Integrator::default();

    let fitted = fit_mixture(&target, &seed, &supports, &FitOptions::default()).unwrap();
    let h = entropy(&target, &supports, &integrator).unwrap();
    assert!((h - 1.4189).abs() < 1e-2, "entropy {h}");

    let start = cross_entropy(&target, &seed, &supports, &integrator).unwrap();
    let end = cross_entropy(&target, &fitted, &supports, &integrator).unwrap();
    assert!(end <= start + 1e-9);
    assert!((end - 1.4189).abs() < 2e-2, "cross-entropy {end}");
}

#[test]
fn refitting_a_fit_barely_moves() {
    let target = tabulated(&[(0.4, -2.0, 0.5), (0.6, 2.0, 0.5)], -6.0, 6.0);
    let supports = IntervalSet::single(-6.0, 6.0);
    let seed = MixGaussians::new(vec![
        (0.5, Gaussian::new(-1.5, 0.7).unwrap()),
        (0.5, Gaussian::new(1.5, 0.7).unwrap()),
    ])
    .unwrap();
    let options = FitOptions::default();
    let once = fit_mixture(&target, &seed, &supports, &options).unwrap();
    let twice = fit_mixture(&target, &once, &supports, &options).unwrap();

    assert_eq!(once.len(), 2);
    assert_eq!(twice.len(), 2);
    for (a, b) in once.components().iter().zip(twice.components()) {
        assert!((a.weight - b.weight).abs() < 1e-2);
        assert!((a.gaussian.mu() - b.gaussian.mu()).abs() < 1e-2);
        assert!((a.gaussian.sigma() - b.gaussian.sigma()).abs() < 1e-2);
    }
}
