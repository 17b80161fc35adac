//! Normalized pointwise products of arbitrary densities.

use bp_common::{Error, Result};
use bp_config::ApproxConfig;
use bp_math::IntervalSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::gaussian::Gaussian;
use super::mixture::MixGaussians;
use super::support::{search_effective_support, trim_support};
use super::Distribution;
use crate::approximation::integrate::Integrator;
use crate::logging::event_names;

/// `Π factors(x) / Z`.
///
/// The normalizing constant and the first two moments are integrated once,
/// at construction, over the union of the factors' effective supports
/// trimmed to where the product is nonzero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionProduct {
    factors: Vec<Distribution>,
    likelihood: bool,
    normalization: f64,
    support: IntervalSet,
    moments: Option<(f64, f64)>,
    support_probes: usize,
}

impl DistributionProduct {
    /// A likelihood product may have no bounded support; it is then left
    /// unnormalized (`Z = 1`) and only evaluates pointwise.
    pub fn new(factors: Vec<Distribution>, likelihood: bool, config: &ApproxConfig) -> Result<Self> {
        if factors.is_empty() {
            return Err(Error::invalid("product of zero densities"));
        }
        for factor in &factors {
            match factor {
                Distribution::Discrete(_) => {
                    return Err(Error::invalid(
                        "discrete factors combine by elementwise product, not integration",
                    ))
                }
                Distribution::Delta(_) => {
                    return Err(Error::invalid("a point mass cannot be normalized by integration"))
                }
                _ => {}
            }
        }

        let product_config = &config.product;
        let mut support = IntervalSet::empty();
        let mut any_support = false;
        for factor in &factors {
            match factor.effective_support(product_config.support_epsilon) {
                Ok(s) => {
                    support = support.union(&s);
                    any_support = true;
                }
                Err(Error::SupportUndefined(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let unnormalized = |x: f64| factors.iter().map(|f| f.density(x)).product::<f64>();

        if !any_support {
            if likelihood {
                return Ok(DistributionProduct {
                    factors,
                    likelihood,
                    normalization: 1.0,
                    support: IntervalSet::empty(),
                    moments: None,
                    support_probes: product_config.support_probes,
                });
            }
            return Err(Error::degenerate(
                "no factor of the product has a bounded support",
            ));
        }

        let support = trim_support(unnormalized, &support, product_config.trim_steps);
        if support.is_empty() {
            debug!(
                event = event_names::PRODUCT_EMPTY_SUPPORT,
                factors = factors.len(),
                "product vanishes on every factor support"
            );
            return Err(Error::degenerate("product density is zero on every factor support"));
        }

        let integrator = Integrator::from_config(&config.integration)
            .with_tolerance(product_config.normalization_tolerance);
        let z = integrator.integrate_with_retry(unnormalized, &support)?;
        if !(z > 0.0) || !z.is_finite() {
            return Err(Error::degenerate(format!("product normalizer is {z}")));
        }
        let m1 = integrator.integrate_with_retry(|x| x * unnormalized(x), &support)? / z;
        let m2 = integrator.integrate_with_retry(|x| x * x * unnormalized(x), &support)? / z;
        debug!(
            event = event_names::PRODUCT_NORMALIZED,
            factors = factors.len(),
            normalization = z,
            mean = m1,
            intervals = support.len(),
            "normalized product"
        );

        Ok(DistributionProduct {
            factors,
            likelihood,
            normalization: z,
            support,
            moments: Some((m1, (m2 - m1 * m1).max(0.0))),
            support_probes: product_config.support_probes,
        })
    }

    pub fn factors(&self) -> &[Distribution] {
        &self.factors
    }

    pub fn is_likelihood(&self) -> bool {
        self.likelihood
    }

    /// `∫ Π factors`; one for an unnormalizable likelihood.
    pub fn normalization(&self) -> f64 {
        self.normalization
    }

    /// Domain the normalizer was integrated over; empty when undefined.
    pub fn support(&self) -> &IntervalSet {
        &self.support
    }

    pub fn density(&self, x: f64) -> f64 {
        self.factors.iter().map(|f| f.density(x)).product::<f64>() / self.normalization
    }

    pub fn mean(&self) -> Result<f64> {
        self.moments
            .map(|(m, _)| m)
            .ok_or_else(|| Error::SupportUndefined("unnormalized likelihood product".to_string()))
    }

    pub fn variance(&self) -> Result<f64> {
        self.moments
            .map(|(_, v)| v)
            .ok_or_else(|| Error::SupportUndefined("unnormalized likelihood product".to_string()))
    }

    pub fn effective_support(&self, epsilon: f64) -> Result<IntervalSet> {
        super::gaussian::check_epsilon(epsilon)?;
        if self.support.is_empty() {
            return Err(Error::SupportUndefined(
                "unnormalized likelihood product".to_string(),
            ));
        }
        search_effective_support(|x| self.density(x), &self.support, epsilon, self.support_probes)
    }

    /// Starting point for fitting: three components per factor, at the
    /// factor's mean and one standard deviation either side, each with the
    /// factor's variance.
    pub fn initial_mix(&self) -> Result<MixGaussians> {
        let mut seeds = Vec::new();
        for factor in &self.factors {
            if let (Ok(mean), Ok(sd)) = (factor.mean(), factor.stddev()) {
                if sd > 0.0 && sd.is_finite() && mean.is_finite() {
                    seeds.push((mean, sd));
                }
            }
        }
        if seeds.is_empty() {
            let (mean, var) = self
                .moments
                .ok_or_else(|| Error::degenerate("no factor has usable moments"))?;
            if !(var > 0.0) {
                return Err(Error::degenerate("product has zero variance"));
            }
            seeds.push((mean, var.sqrt()));
        }

        let weight = 1.0 / (3 * seeds.len()) as f64;
        let mut components = Vec::with_capacity(3 * seeds.len());
        for (mean, sd) in seeds {
            for offset in [0.0, -sd, sd] {
                components.push((weight, Gaussian::new(mean + offset, sd)?));
            }
        }
        MixGaussians::new(components)
    }
}
