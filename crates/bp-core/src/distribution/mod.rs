//! The distribution family exchanged as messages.
//!
//! [`Distribution`] is a closed sum type; every operation matches on the
//! variant. Which combinations of variants a message helper accepts is
//! decided by runtime tags (see [`crate::tags`]), not by this type.

pub mod discrete;
pub mod gaussian;
pub mod mixture;
pub mod product;
pub mod spline;
pub(crate) mod support;

pub use discrete::Discrete;
pub use gaussian::{
    gaussian_product, gaussian_product_constant, ln_gaussian_product_constant, Delta, Gaussian,
    GaussianPrior,
};
pub use mixture::{MixComponent, MixGaussians, Mixture};
pub use product::DistributionProduct;
pub use spline::SplineDensity;

use bp_common::{Error, Result};
use bp_math::IntervalSet;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tags::TypeTag;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    Delta(Delta),
    Discrete(Discrete),
    Gaussian(Gaussian),
    MixtureOfGaussians(MixGaussians),
    GenericMixture(Mixture),
    SplineDensity(SplineDensity),
    /// Flat; the identity of every product.
    Noninformative,
    Product(DistributionProduct),
}

impl Distribution {
    pub fn gaussian(mu: f64, sigma: f64) -> Result<Self> {
        Ok(Distribution::Gaussian(Gaussian::new(mu, sigma)?))
    }

    /// `N(mu, variance)`, or a point mass when the variance is zero.
    pub fn gaussian_or_delta(mu: f64, variance: f64) -> Result<Self> {
        if variance == 0.0 {
            Ok(Distribution::Delta(Delta::new(mu)?))
        } else if variance > 0.0 {
            Distribution::gaussian(mu, variance.sqrt())
        } else {
            Err(Error::invalid(format!("variance must be nonnegative, got {variance}")))
        }
    }

    pub fn delta(point: f64) -> Result<Self> {
        Ok(Distribution::Delta(Delta::new(point)?))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Distribution::Delta(_) => TypeTag::Delta,
            Distribution::Discrete(_) => TypeTag::Discrete,
            Distribution::Gaussian(_) => TypeTag::Gaussian,
            Distribution::MixtureOfGaussians(_) => TypeTag::MixGaussians,
            Distribution::GenericMixture(_) => TypeTag::Mixture,
            Distribution::SplineDensity(_) => TypeTag::SplineDensity,
            Distribution::Noninformative => TypeTag::Noninformative,
            Distribution::Product(_) => TypeTag::Product,
        }
    }

    pub fn is_noninformative(&self) -> bool {
        matches!(self, Distribution::Noninformative)
    }

    /// Number of coordinates a point in the domain has.
    pub fn ndimensions(&self) -> usize {
        match self {
            Distribution::Discrete(d) => d.dimensions().len(),
            _ => 1,
        }
    }

    /// Density (or mass) at a scalar point.
    ///
    /// Multidimensional discrete tables read `x` as a flat index.
    pub fn density(&self, x: f64) -> f64 {
        match self {
            Distribution::Delta(d) => d.density(x),
            Distribution::Discrete(d) => d.density(x),
            Distribution::Gaussian(g) => g.density(x),
            Distribution::MixtureOfGaussians(m) => m.density(x),
            Distribution::GenericMixture(m) => m.density(x),
            Distribution::SplineDensity(s) => s.density(x),
            Distribution::Noninformative => 1.0,
            Distribution::Product(p) => p.density(x),
        }
    }

    /// Density at a point given as coordinates.
    pub fn density_at(&self, x: &[f64]) -> Result<f64> {
        match self {
            Distribution::Discrete(d) => d.density_at(x),
            _ if x.len() == 1 => Ok(self.density(x[0])),
            _ => Err(Error::DomainError {
                expected: 1,
                actual: x.len(),
            }),
        }
    }

    pub fn mean(&self) -> Result<f64> {
        match self {
            Distribution::Delta(d) => Ok(d.point),
            Distribution::Discrete(d) => Ok(d.mean()),
            Distribution::Gaussian(g) => Ok(g.mu()),
            Distribution::MixtureOfGaussians(m) => Ok(m.mean()),
            Distribution::GenericMixture(m) => m.mean(),
            Distribution::SplineDensity(s) => Ok(s.mean()),
            Distribution::Noninformative => Err(Error::SupportUndefined(
                "noninformative distribution has no mean".to_string(),
            )),
            Distribution::Product(p) => p.mean(),
        }
    }

    pub fn variance(&self) -> Result<f64> {
        match self {
            Distribution::Delta(_) => Ok(0.0),
            Distribution::Discrete(d) => Ok(d.variance()),
            Distribution::Gaussian(g) => Ok(g.variance()),
            Distribution::MixtureOfGaussians(m) => Ok(m.variance()),
            Distribution::GenericMixture(m) => m.variance(),
            Distribution::SplineDensity(s) => Ok(s.variance()),
            Distribution::Noninformative => Err(Error::SupportUndefined(
                "noninformative distribution has no variance".to_string(),
            )),
            Distribution::Product(p) => p.variance(),
        }
    }

    pub fn stddev(&self) -> Result<f64> {
        self.variance().map(f64::sqrt)
    }

    /// Sets holding all but `epsilon` of the mass.
    ///
    /// Fails with [`Error::InvalidArgument`] unless `0 < epsilon < 1`, and
    /// with [`Error::SupportUndefined`] when the distribution has no
    /// bounded region of mass.
    pub fn effective_support(&self, epsilon: f64) -> Result<IntervalSet> {
        gaussian::check_epsilon(epsilon)?;
        match self {
            Distribution::Delta(d) => Ok(IntervalSet::single(d.point, d.point)),
            Distribution::Discrete(d) => Ok(IntervalSet::from(d.effective_support(epsilon))),
            Distribution::Gaussian(g) => Ok(IntervalSet::from(g.effective_support(epsilon)?)),
            Distribution::MixtureOfGaussians(m) => m.effective_support(epsilon),
            Distribution::GenericMixture(m) => m.effective_support(epsilon),
            Distribution::SplineDensity(s) => Ok(IntervalSet::from(s.effective_support(epsilon)?)),
            Distribution::Noninformative => Err(Error::SupportUndefined(
                "noninformative distribution".to_string(),
            )),
            Distribution::Product(p) => p.effective_support(epsilon),
        }
    }

    /// `(mu, sigma)` for a Gaussian, `(point, 0)` for a point mass.
    pub fn gaussian_params(&self) -> Option<(f64, f64)> {
        match self {
            Distribution::Gaussian(g) => Some((g.mu(), g.sigma())),
            Distribution::Delta(d) => Some((d.point, 0.0)),
            _ => None,
        }
    }

    /// Gaussian mixtures as-is; a Gaussian as a one-component mixture.
    pub fn as_mix_gaussians(&self) -> Option<MixGaussians> {
        match self {
            Distribution::MixtureOfGaussians(m) => Some(m.clone()),
            Distribution::Gaussian(g) => Some(MixGaussians::single(*g)),
            _ => None,
        }
    }

    /// Weighted terms when read as a mixture; anything else is a single
    /// term of weight one.
    pub fn mixture_terms(&self) -> Vec<(f64, Distribution)> {
        match self {
            Distribution::MixtureOfGaussians(m) => m
                .components()
                .iter()
                .map(|c| (c.weight, Distribution::Gaussian(c.gaussian)))
                .collect(),
            Distribution::GenericMixture(m) => {
                m.iter().map(|(w, d)| (w, d.clone())).collect()
            }
            other => vec![(1.0, other.clone())],
        }
    }

    /// Draws one value; multidimensional tables return a flat index.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        match self {
            Distribution::Delta(d) => Ok(d.point),
            Distribution::Discrete(d) => Ok(d.sample(rng)),
            Distribution::Gaussian(g) => Ok(g.sample(rng)),
            Distribution::MixtureOfGaussians(m) => Ok(m.sample(rng)),
            Distribution::GenericMixture(m) => m.sample(rng),
            other => Err(Error::invalid(format!(
                "sampling is not available for {}",
                other.type_tag()
            ))),
        }
    }
}

impl From<Gaussian> for Distribution {
    fn from(g: Gaussian) -> Self {
        Distribution::Gaussian(g)
    }
}

impl From<MixGaussians> for Distribution {
    fn from(m: MixGaussians) -> Self {
        Distribution::MixtureOfGaussians(m)
    }
}

impl From<Discrete> for Distribution {
    fn from(d: Discrete) -> Self {
        Distribution::Discrete(d)
    }
}
