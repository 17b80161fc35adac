//! Products of mixtures, expanded term by term.
//!
//! Multiplying mixtures `Σ_i w_i p_i` and `Σ_j v_j q_j` gives
//! `Σ_ij w_i v_j p_i q_j`. Each term is renormalized to a density, so its
//! weight picks up the overlap `∫ p_i q_j`. Gaussian terms have closed
//! forms; anything else becomes a [`DistributionProduct`].

use bp_common::{Error, Result};
use bp_config::ApproxConfig;

use crate::distribution::{
    gaussian_product, gaussian_product_constant, Discrete, Distribution, DistributionProduct,
    Gaussian, MixGaussians, Mixture,
};

/// One cell of a cross product.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductTerm {
    /// Component chosen from each factor.
    pub indices: Vec<usize>,
    /// Product of the chosen mixing proportions.
    pub prior_weight: f64,
    /// `∫ Π chosen densities`.
    pub overlap: f64,
    pub distribution: Distribution,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossProduct {
    terms: Vec<ProductTerm>,
}

impl CrossProduct {
    pub fn terms(&self) -> &[ProductTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn prior_weights(&self) -> Vec<f64> {
        self.terms.iter().map(|t| t.prior_weight).collect()
    }

    /// `prior_weight · overlap`, normalized; `None` when every term
    /// vanishes.
    pub fn posterior_weights(&self) -> Option<Vec<f64>> {
        let raw: Vec<f64> = self
            .terms
            .iter()
            .map(|t| t.prior_weight * t.overlap)
            .collect();
        bp_math::normalized(&raw)
    }

    /// Replaces each term's distribution, keeping weights.
    pub fn map_terms<F>(self, mut f: F) -> Result<CrossProduct>
    where
        F: FnMut(ProductTerm) -> Result<Distribution>,
    {
        let mut terms = Vec::with_capacity(self.terms.len());
        for term in self.terms {
            let (indices, prior_weight, overlap) =
                (term.indices.clone(), term.prior_weight, term.overlap);
            terms.push(ProductTerm {
                indices,
                prior_weight,
                overlap,
                distribution: f(term)?,
            });
        }
        Ok(CrossProduct { terms })
    }

    /// Mixture over the terms; a single surviving term is returned bare.
    pub fn into_distribution(self) -> Result<Distribution> {
        let weights = self
            .posterior_weights()
            .ok_or_else(|| Error::degenerate("every term of the mixture product vanishes"))?;
        let components: Vec<(f64, Distribution)> = weights
            .into_iter()
            .zip(self.terms)
            .map(|(w, t)| (w, t.distribution))
            .collect();
        Ok(Mixture::new(components)?.into_distribution())
    }
}

/// Every combination of one term from each list, with the product of the
/// chosen weights.
pub(crate) fn cross_terms(
    lists: &[Vec<(f64, Distribution)>],
) -> Vec<(Vec<usize>, f64, Vec<Distribution>)> {
    if lists.iter().any(|l| l.is_empty()) {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut indices = vec![0usize; lists.len()];
    loop {
        let weight: f64 = indices
            .iter()
            .zip(lists)
            .map(|(&i, list)| list[i].0)
            .product();
        let parts: Vec<Distribution> = indices
            .iter()
            .zip(lists)
            .map(|(&i, list)| list[i].1.clone())
            .collect();
        out.push((indices.clone(), weight, parts));

        // Odometer increment, last factor fastest.
        let mut position = lists.len();
        loop {
            if position == 0 {
                return out;
            }
            position -= 1;
            indices[position] += 1;
            if indices[position] < lists[position].len() {
                break;
            }
            indices[position] = 0;
        }
    }
}

/// Normalized product of single densities with its overlap constant.
///
/// `None` means the densities share no mass. Noninformative parts are
/// skipped; a point mass absorbs everything else.
pub fn combine_components(
    parts: &[Distribution],
    config: &ApproxConfig,
) -> Result<Option<(f64, Distribution)>> {
    let informative: Vec<&Distribution> = parts.iter().filter(|d| !d.is_noninformative()).collect();
    match informative.len() {
        0 => return Ok(Some((1.0, Distribution::Noninformative))),
        1 => return Ok(Some((1.0, informative[0].clone()))),
        _ => {}
    }

    let point = informative.iter().find_map(|d| match d {
        Distribution::Delta(delta) => Some(delta.point),
        _ => None,
    });
    if let Some(point) = point {
        let mut overlap = 1.0;
        for d in &informative {
            match d {
                Distribution::Delta(other) if other.point != point => return Ok(None),
                Distribution::Delta(_) => {}
                other => overlap *= other.density(point),
            }
        }
        if !(overlap > 0.0) {
            return Ok(None);
        }
        return Ok(Some((overlap, Distribution::delta(point)?)));
    }

    let discrete: Vec<&Discrete> = informative
        .iter()
        .filter_map(|d| match d {
            Distribution::Discrete(t) => Some(t),
            _ => None,
        })
        .collect();
    if !discrete.is_empty() {
        if discrete.len() != informative.len() {
            return Err(Error::invalid(
                "cannot multiply a discrete table by a continuous density",
            ));
        }
        let n = discrete[0].len();
        if discrete.iter().any(|t| t.len() != n) {
            return Err(Error::invalid("discrete factors differ in state count"));
        }
        let raw: Vec<f64> = (0..n)
            .map(|i| discrete.iter().map(|t| t.probability(i)).product())
            .collect();
        let overlap: f64 = raw.iter().sum();
        if !(overlap > 0.0) {
            return Ok(None);
        }
        let table = Discrete::new(discrete[0].dimensions().to_vec(), raw)?;
        return Ok(Some((overlap, Distribution::Discrete(table))));
    }

    let gaussians: Option<Vec<Gaussian>> = informative
        .iter()
        .map(|d| match d {
            Distribution::Gaussian(g) => Some(*g),
            _ => None,
        })
        .collect();
    if let Some(gaussians) = gaussians {
        let overlap = gaussian_product_constant(&gaussians);
        return Ok(Some((overlap, Distribution::Gaussian(gaussian_product(&gaussians)?))));
    }

    let owned: Vec<Distribution> = informative.into_iter().cloned().collect();
    match DistributionProduct::new(owned, false, config) {
        Ok(product) => Ok(Some((product.normalization(), Distribution::Product(product)))),
        Err(Error::DegenerateSupport(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Term-by-term product of any mixtures (non-mixtures count as one term).
/// Terms with no shared mass are dropped.
pub fn cross_product(factors: &[Distribution], config: &ApproxConfig) -> Result<CrossProduct> {
    let lists: Vec<Vec<(f64, Distribution)>> = factors.iter().map(|f| f.mixture_terms()).collect();
    let mut terms = Vec::new();
    for (indices, prior_weight, parts) in cross_terms(&lists) {
        if let Some((overlap, distribution)) = combine_components(&parts, config)? {
            terms.push(ProductTerm {
                indices,
                prior_weight,
                overlap,
                distribution,
            });
        }
    }
    Ok(CrossProduct { terms })
}

/// Closed-form product of Gaussian mixtures.
pub fn gaussian_mixture_product(factors: &[MixGaussians]) -> Result<MixGaussians> {
    if factors.is_empty() {
        return Err(Error::invalid("product of zero mixtures"));
    }
    let wrapped: Vec<Distribution> = factors
        .iter()
        .map(|m| Distribution::MixtureOfGaussians(m.clone()))
        .collect();
    let product = cross_product(&wrapped, &ApproxConfig::default())?;
    let weights = product
        .posterior_weights()
        .ok_or_else(|| Error::degenerate("mixtures share no mass"))?;
    let components = weights
        .into_iter()
        .zip(product.terms())
        .map(|(w, t)| match &t.distribution {
            Distribution::Gaussian(g) => Ok((w, *g)),
            other => Err(Error::Numerical(format!(
                "Gaussian product produced a {}",
                other.type_tag()
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    MixGaussians::new(components)
}
