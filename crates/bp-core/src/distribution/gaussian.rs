//! Univariate Gaussian, point mass, and their closed-form products.

use bp_common::{Error, Result};
use bp_math::{normal_ln_pdf, normal_pdf, two_sided_z, Interval, LN_SQRT_2PI};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Conjugate-prior hyperparameters used when fitting a component with a
/// finite equivalent sample size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianPrior {
    /// Pseudo-count behind `mu_hat`.
    pub eta: f64,
    pub mu_hat: f64,
    pub alpha: f64,
    pub beta: f64,
}

impl Default for GaussianPrior {
    fn default() -> Self {
        GaussianPrior {
            eta: 0.0,
            mu_hat: 0.0,
            alpha: 0.5,
            beta: 0.0,
        }
    }
}

/// `N(mu, sigma²)` with `sigma > 0`.
///
/// A zero-width Gaussian is a [`Delta`]; constructors that could produce
/// one return the enclosing [`super::Distribution`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    mu: f64,
    sigma: f64,
    #[serde(default)]
    prior: GaussianPrior,
}

impl Gaussian {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !mu.is_finite() {
            return Err(Error::invalid(format!("Gaussian mean must be finite, got {mu}")));
        }
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(Error::invalid(format!(
                "Gaussian sigma must be positive and finite, got {sigma}"
            )));
        }
        Ok(Gaussian {
            mu,
            sigma,
            prior: GaussianPrior::default(),
        })
    }

    pub fn from_variance(mu: f64, variance: f64) -> Result<Self> {
        Gaussian::new(mu, variance.sqrt())
    }

    pub fn standard() -> Self {
        Gaussian {
            mu: 0.0,
            sigma: 1.0,
            prior: GaussianPrior::default(),
        }
    }

    pub fn with_prior(mut self, prior: GaussianPrior) -> Self {
        self.prior = prior;
        self
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    pub fn prior(&self) -> &GaussianPrior {
        &self.prior
    }

    pub fn density(&self, x: f64) -> f64 {
        normal_pdf(x, self.mu, self.sigma)
    }

    pub fn ln_density(&self, x: f64) -> f64 {
        normal_ln_pdf(x, self.mu, self.sigma)
    }

    /// Central interval holding `1 - epsilon` of the mass.
    pub fn effective_support(&self, epsilon: f64) -> Result<Interval> {
        check_epsilon(epsilon)?;
        let half = two_sided_z(epsilon) * self.sigma;
        Ok(Interval::new(self.mu - half, self.mu + half))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.mu + self.sigma * standard_normal_draw(rng)
    }
}

/// Point mass at `point`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub point: f64,
}

impl Delta {
    pub fn new(point: f64) -> Result<Self> {
        if !point.is_finite() {
            return Err(Error::invalid(format!("delta location must be finite, got {point}")));
        }
        Ok(Delta { point })
    }

    /// One at the support point, zero elsewhere.
    pub fn density(&self, x: f64) -> f64 {
        if x == self.point {
            1.0
        } else {
            0.0
        }
    }
}

pub(crate) fn check_epsilon(epsilon: f64) -> Result<()> {
    if epsilon > 0.0 && epsilon < 1.0 {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "support tail mass must lie in (0, 1), got {epsilon}"
        )))
    }
}

/// Box-Muller draw from `N(0, 1)`.
pub(crate) fn standard_normal_draw<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // 1 - u keeps the logarithm finite.
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Normalized pointwise product of Gaussian densities.
///
/// Precisions add and the mean is the precision-weighted average.
pub fn gaussian_product(factors: &[Gaussian]) -> Result<Gaussian> {
    if factors.is_empty() {
        return Err(Error::invalid("product of zero Gaussians"));
    }
    let precision: f64 = factors.iter().map(|g| 1.0 / g.variance()).sum();
    let weighted: f64 = factors.iter().map(|g| g.mu / g.variance()).sum();
    Gaussian::new(weighted / precision, (1.0 / precision).sqrt())
}

/// `∫ Π N(x; mu_i, sigma_i²) dx`, evaluated in log space.
pub fn gaussian_product_constant(factors: &[Gaussian]) -> f64 {
    ln_gaussian_product_constant(factors).exp()
}

pub fn ln_gaussian_product_constant(factors: &[Gaussian]) -> f64 {
    if factors.is_empty() {
        return 0.0;
    }
    let n = factors.len() as f64;
    let a: f64 = factors.iter().map(|g| 1.0 / g.variance()).sum();
    let b: f64 = factors.iter().map(|g| g.mu / g.variance()).sum();
    let ln_var: f64 = factors.iter().map(|g| g.variance().ln()).sum();
    // Centred on the precision-weighted mean, Σmu²/s² - B²/A becomes a sum
    // of nonnegative terms.
    let m = b / a;
    let spread: f64 = factors
        .iter()
        .map(|g| (g.mu - m).powi(2) / g.variance())
        .sum();
    -(n - 1.0) * LN_SQRT_2PI - 0.5 * (ln_var + a.ln()) - 0.5 * spread
}
