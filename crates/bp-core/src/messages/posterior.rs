//! Posterior `∝ pi · lambda`.

use bp_common::{Error, Result};

use super::dispatch::{HelperTable, PatternElement};
use super::{as_gaussian, MessageEngine, PosteriorHelper};
use crate::approximation::{cross_product, gaussian_mixture_product};
use crate::distribution::{gaussian_product, Discrete, Distribution, DistributionProduct};
use crate::tags::TypeTag;

pub(crate) fn register(table: &mut HelperTable<PosteriorHelper>) {
    use PatternElement as P;
    use TypeTag as T;

    table.register(
        "abstract/noninformative",
        vec![P::one(T::AnyDistribution), P::one(T::Noninformative)],
        keep_pi,
    );
    table.register(
        "noninformative/abstract",
        vec![P::one(T::Noninformative), P::one(T::AnyDistribution)],
        keep_lambda,
    );
    table.register(
        "delta/abstract",
        vec![P::one(T::Delta), P::one(T::AnyDistribution)],
        point_pi,
    );
    table.register(
        "abstract/delta",
        vec![P::one(T::AnyDistribution), P::one(T::Delta)],
        point_lambda,
    );
    table.register(
        "discrete/discrete",
        vec![P::one(T::Discrete), P::one(T::Discrete)],
        discrete_discrete,
    );
    table.register(
        "discrete/abstract",
        vec![P::one(T::Discrete), P::one(T::AnyDistribution)],
        discrete_weighted,
    );
    table.register(
        "gaussian/gaussian",
        vec![P::one(T::Gaussian), P::one(T::Gaussian)],
        gaussian_gaussian,
    );
    table.register(
        "mix-gaussians/mix-gaussians",
        vec![P::one(T::MixGaussians), P::one(T::MixGaussians)],
        mix_gaussians,
    );
    table.register(
        "mixture/abstract",
        vec![P::one(T::Mixture), P::one(T::AnyDistribution)],
        mixture_terms,
    );
    table.register(
        "abstract/mixture",
        vec![P::one(T::AnyDistribution), P::one(T::Mixture)],
        mixture_terms,
    );
    table.register(
        "abstract/abstract",
        vec![P::one(T::AnyDistribution), P::one(T::AnyDistribution)],
        numeric,
    );
}

fn keep_pi(_: &MessageEngine, pi: &Distribution, _: &Distribution) -> Result<Option<Distribution>> {
    Ok(Some(pi.clone()))
}

fn keep_lambda(
    _: &MessageEngine,
    _: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    Ok(Some(lambda.clone()))
}

fn point_pi(
    _: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    let Distribution::Delta(delta) = pi else {
        return Ok(None);
    };
    if !(lambda.density(delta.point) > 0.0) {
        return Err(Error::degenerate(format!(
            "likelihood vanishes at the prior's point {}",
            delta.point
        )));
    }
    Ok(Some(pi.clone()))
}

fn point_lambda(
    _: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    let Distribution::Delta(delta) = lambda else {
        return Ok(None);
    };
    if !(pi.density(delta.point) > 0.0) {
        return Err(Error::degenerate(format!(
            "prior vanishes at the evidence {}",
            delta.point
        )));
    }
    Ok(Some(lambda.clone()))
}

fn discrete_discrete(
    _: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    match (pi, lambda) {
        (Distribution::Discrete(p), Distribution::Discrete(l)) => {
            Ok(Some(Distribution::Discrete(p.product(l)?)))
        }
        _ => Ok(None),
    }
}

/// `p_i · lambda(i)` over the states of the prior.
fn discrete_weighted(
    _: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    let Distribution::Discrete(p) = pi else {
        return Ok(None);
    };
    let raw: Vec<f64> = p
        .probabilities()
        .iter()
        .enumerate()
        .map(|(i, pi_i)| pi_i * lambda.density(i as f64))
        .collect();
    Ok(Some(Distribution::Discrete(Discrete::new(
        p.dimensions().to_vec(),
        raw,
    )?)))
}

fn gaussian_gaussian(
    _: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    let (Some(p), Some(l)) = (as_gaussian(pi), as_gaussian(lambda)) else {
        return Ok(None);
    };
    Ok(Some(Distribution::Gaussian(gaussian_product(&[p, l])?)))
}

fn mix_gaussians(
    engine: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    let (Some(p), Some(l)) = (pi.as_mix_gaussians(), lambda.as_mix_gaussians()) else {
        return Ok(None);
    };
    let product = gaussian_mixture_product(&[p, l])?;
    engine
        .prune(product, &engine.config().similarity.general)
        .map(Some)
}

/// Term-by-term product; terms without a closed form are fitted.
fn mixture_terms(
    engine: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    let product = cross_product(&[pi.clone(), lambda.clone()], engine.config())?;
    if product.is_empty() {
        return Err(Error::degenerate("prior and likelihood share no mass"));
    }
    let tolerance = engine.config().messages.posterior_fit_tolerance;
    let fitted = product.map_terms(|term| match term.distribution {
        d @ Distribution::Product(_) => engine.approximate(&d, tolerance),
        d => Ok(d),
    })?;
    match fitted.into_distribution()? {
        Distribution::MixtureOfGaussians(m) => engine
            .prune(m, &engine.config().similarity.general)
            .map(Some),
        other => Ok(Some(other)),
    }
}

fn numeric(
    engine: &MessageEngine,
    pi: &Distribution,
    lambda: &Distribution,
) -> Result<Option<Distribution>> {
    let product = DistributionProduct::new(vec![pi.clone(), lambda.clone()], false, engine.config())?;
    engine
        .approximate(
            &Distribution::Product(product),
            engine.config().messages.posterior_fit_tolerance,
        )
        .map(Some)
}
