//! Fitting a Gaussian mixture to an arbitrary density (EM on a density).
//!
//! Each iteration evaluates, for every component, the mass, mean, and
//! spread of the target density weighted by that component's
//! responsibility under the previous mixture. The M-step either takes
//! those moments directly or blends them with a conjugate prior whose
//! strength is the equivalent sample size. After every iteration light
//! components and near-duplicates are pruned.

use bp_common::{Error, Result};
use bp_config::{ApproxConfig, SimilarityThresholds};
use bp_math::IntervalSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::integrate::Integrator;
use crate::distribution::{Distribution, Gaussian, MixComponent, MixGaussians};
use crate::logging::event_names;

/// Settings for one fitting run.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub max_iterations: usize,
    pub min_mix_proportion: f64,
    pub similarity: SimilarityThresholds,
    /// Quadrature tolerance for the moment integrals.
    pub tolerance: f64,
    /// `None` or infinity disables regularization.
    pub equivalent_sample_size: Option<f64>,
    pub convergence_threshold: Option<f64>,
    pub trace: bool,
    pub integration_limit: usize,
    pub retry_factor: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions::from_config(&ApproxConfig::default())
    }
}

impl FitOptions {
    pub fn from_config(config: &ApproxConfig) -> Self {
        FitOptions {
            max_iterations: config.fit.max_iterations,
            min_mix_proportion: config.fit.min_mix_proportion,
            similarity: config.similarity.general,
            tolerance: config.fit.tolerance,
            equivalent_sample_size: config.fit.equivalent_sample_size,
            convergence_threshold: config.fit.convergence_threshold,
            trace: config.fit.trace,
            integration_limit: config.integration.limit,
            retry_factor: config.integration.retry_factor,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_equivalent_sample_size(mut self, n: Option<f64>) -> Self {
        self.equivalent_sample_size = n;
        self
    }

    pub fn with_similarity(mut self, similarity: SimilarityThresholds) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    fn integrator(&self) -> Integrator {
        Integrator::new(self.tolerance, self.integration_limit, self.retry_factor)
    }

    fn regularization(&self) -> Option<f64> {
        self.equivalent_sample_size.filter(|n| n.is_finite())
    }

    fn tracks_cross_entropy(&self) -> bool {
        self.trace || self.convergence_threshold.is_some()
    }
}

/// Mixture state after one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitIteration {
    pub iteration: usize,
    pub weights: Vec<f64>,
    pub means: Vec<f64>,
    pub stddevs: Vec<f64>,
    pub cross_entropy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    pub mixture: MixGaussians,
    /// Iterations actually run; zero for a short-circuited target.
    pub iterations: usize,
    /// Filled only when tracing is requested.
    pub trace: Vec<FitIteration>,
    /// Differential entropy of the target, the floor for the cross-entropy.
    pub target_entropy: Option<f64>,
}

/// Fits `initial` to `target` over `supports`.
pub fn fit_mixture(
    target: &Distribution,
    initial: &MixGaussians,
    supports: &IntervalSet,
    options: &FitOptions,
) -> Result<MixGaussians> {
    fit_mixture_with_report(target, initial, supports, options).map(|r| r.mixture)
}

pub fn fit_mixture_with_report(
    target: &Distribution,
    initial: &MixGaussians,
    supports: &IntervalSet,
    options: &FitOptions,
) -> Result<FitReport> {
    let short_circuit = match target {
        Distribution::MixtureOfGaussians(m) => Some(m.clone()),
        Distribution::Gaussian(g) => Some(MixGaussians::single(*g)),
        Distribution::Delta(_) | Distribution::Discrete(_) | Distribution::Noninformative => {
            return Err(Error::invalid(format!(
                "cannot fit a Gaussian mixture to a {} target",
                target.type_tag()
            )))
        }
        _ => None,
    };
    if let Some(mixture) = short_circuit {
        debug!(
            event = event_names::FIT_SHORT_CIRCUIT,
            target = %target.type_tag(),
            components = mixture.len(),
            "target is already a Gaussian mixture"
        );
        return Ok(FitReport {
            mixture,
            iterations: 0,
            trace: Vec::new(),
            target_entropy: None,
        });
    }

    let supports = supports.union_merge();
    if supports.is_empty() || !(supports.total_width() > 0.0) {
        return Err(Error::degenerate("fitting domain is empty"));
    }
    if supports.iter().any(|i| !i.is_finite()) {
        return Err(Error::invalid("fitting domain must be bounded"));
    }

    let integrator = options.integrator();
    let n_equiv = options.regularization();
    if let Some(n) = n_equiv {
        check_prior_strength(initial, n)?;
    }
    debug!(
        event = event_names::FIT_STARTED,
        target = %target.type_tag(),
        components = initial.len(),
        intervals = supports.len(),
        equivalent_sample_size = ?n_equiv,
        "fitting mixture"
    );

    let target_entropy = if options.tracks_cross_entropy() {
        Some(entropy(target, &supports, &integrator)?)
    } else {
        None
    };

    let mut mixture = initial.clone();
    let mut trace = Vec::new();
    let mut previous: Option<f64> = None;
    let mut iterations = 0;

    for iteration in 1..=options.max_iterations {
        let updated = em_step(target, &mixture, &supports, &integrator, n_equiv)?;
        if updated.is_empty() {
            return Err(Error::degenerate(
                "every component lost its mass on the fitting domain",
            ));
        }
        mixture = MixGaussians::from_components(updated)?
            .simplify(options.min_mix_proportion, &options.similarity)?;
        iterations = iteration;

        let ce = if options.tracks_cross_entropy() {
            Some(cross_entropy(target, &mixture, &supports, &integrator)?)
        } else {
            None
        };
        debug!(
            event = event_names::FIT_ITERATION,
            iteration,
            components = mixture.len(),
            weights = ?mixture.weights(),
            cross_entropy = ?ce,
            "fit iteration"
        );
        if options.trace {
            trace.push(FitIteration {
                iteration,
                weights: mixture.weights(),
                means: mixture.components().iter().map(|c| c.gaussian.mu()).collect(),
                stddevs: mixture.components().iter().map(|c| c.gaussian.sigma()).collect(),
                cross_entropy: ce,
            });
        }

        if let (Some(threshold), Some(now), Some(before)) =
            (options.convergence_threshold, ce, previous)
        {
            if (before - now).abs() < threshold {
                debug!(
                    event = event_names::FIT_CONVERGED,
                    iteration,
                    cross_entropy = now,
                    "cross-entropy settled"
                );
                break;
            }
        }
        previous = ce;
    }

    debug!(
        event = event_names::FIT_FINISHED,
        iterations,
        components = mixture.len(),
        "fit finished"
    );
    Ok(FitReport {
        mixture,
        iterations,
        trace,
        target_entropy,
    })
}

/// The regularized variance divides by `N·a + eta + 2(alpha - 1)` with the
/// component mass `a` at most one. A prior and sample size for which that
/// is not positive even at full mass cannot yield a variance.
fn check_prior_strength(initial: &MixGaussians, n: f64) -> Result<()> {
    if !(n > 0.0) {
        return Err(Error::invalid(format!(
            "equivalent sample size must be positive, got {n}"
        )));
    }
    for (i, component) in initial.components().iter().enumerate() {
        let prior = component.gaussian.prior();
        let denominator = n + prior.eta + 2.0 * (prior.alpha - 1.0);
        if !(denominator > 0.0) {
            return Err(Error::invalid(format!(
                "component {i}: prior (alpha = {}, eta = {}) is too weak for equivalent sample \
                 size {n}; N + eta + 2(alpha - 1) = {denominator} must be positive",
                prior.alpha, prior.eta
            )));
        }
    }
    Ok(())
}

/// One EM update. Components whose mass vanishes or whose variance is not
/// positive are dropped before any division by them.
fn em_step(
    target: &Distribution,
    mixture: &MixGaussians,
    supports: &IntervalSet,
    integrator: &Integrator,
    n_equiv: Option<f64>,
) -> Result<Vec<MixComponent>> {
    let k = mixture.len() as f64;
    let gamma_total: f64 = mixture.components().iter().map(|c| c.gamma).sum();
    let mut updated = Vec::with_capacity(mixture.len());

    for (i, component) in mixture.components().iter().enumerate() {
        let weighted = |x: f64| target.density(x) * mixture.responsibility(i, x);
        let a = integrator.integrate_with_retry(weighted, supports)?;
        if !(a > 0.0) || !a.is_finite() {
            debug!(
                event = event_names::FIT_COMPONENT_PRUNED,
                component = i,
                mass = a,
                "component has no mass on the target"
            );
            continue;
        }
        let m = integrator.integrate_with_retry(|x| x * weighted(x), supports)?;
        let centre = m / a;
        let v = integrator.integrate_with_retry(|x| (x - centre).powi(2) * weighted(x), supports)?;

        let (weight, mean, variance) = match n_equiv {
            None => (a, centre, v / a),
            Some(n) => {
                let prior = component.gaussian.prior();
                let weight = (n * a + component.gamma - 1.0) / (n + gamma_total - k);
                let mean = (n * m + prior.eta * prior.mu_hat) / (n * a + prior.eta);
                let variance = (n * v + prior.eta * (centre - prior.mu_hat).powi(2) + 2.0 * prior.beta)
                    / (n * a + prior.eta + 2.0 * (prior.alpha - 1.0));
                (weight.max(0.0), mean, variance)
            }
        };

        if !(variance > 0.0) || !variance.is_finite() || !mean.is_finite() || !(weight > 0.0) {
            debug!(
                event = event_names::FIT_COMPONENT_PRUNED,
                component = i,
                mass = a,
                variance,
                "component collapsed"
            );
            continue;
        }
        updated.push(MixComponent {
            weight,
            gaussian: Gaussian::new(mean, variance.sqrt())?.with_prior(*component.gaussian.prior()),
            gamma: component.gamma,
        });
    }
    Ok(updated)
}

/// `-∫ p(x) ln q(x) dx` over `supports`.
pub fn cross_entropy(
    target: &Distribution,
    mixture: &MixGaussians,
    supports: &IntervalSet,
    integrator: &Integrator,
) -> Result<f64> {
    let value = integrator.integrate_with_retry(
        |x| {
            let p = target.density(x);
            if p > 0.0 {
                -p * mixture.ln_density(x)
            } else {
                0.0
            }
        },
        supports,
    )?;
    Ok(value)
}

/// `-∫ p(x) ln p(x) dx` over `supports`.
pub fn entropy(target: &Distribution, supports: &IntervalSet, integrator: &Integrator) -> Result<f64> {
    integrator.integrate_with_retry(
        |x| {
            let p = target.density(x);
            if p > 0.0 {
                -p * p.ln()
            } else {
                0.0
            }
        },
        supports,
    )
}
