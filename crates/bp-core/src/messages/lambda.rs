//! Combining a variable's lambda messages into one likelihood.

use bp_common::{Error, Result};

use super::dispatch::{HelperTable, PatternElement};
use super::{as_gaussian, LambdaHelper, MessageEngine};
use crate::approximation::gaussian_mixture_product;
use crate::distribution::{gaussian_product, Distribution, DistributionProduct};
use crate::tags::TypeTag;

pub(crate) fn register(table: &mut HelperTable<LambdaHelper>) {
    table.register(
        "gaussian",
        vec![PatternElement::any_number(TypeTag::Gaussian)],
        gaussians,
    );
    table.register(
        "mix-gaussians",
        vec![PatternElement::any_number(TypeTag::MixGaussians)],
        mixtures,
    );
    table.register(
        "discrete",
        vec![PatternElement::any_number(TypeTag::Discrete)],
        discrete,
    );
    table.register(
        "abstract",
        vec![PatternElement::any_number(TypeTag::AnyDistribution)],
        generic,
    );
}

fn gaussians(_: &MessageEngine, lambdas: &[Distribution]) -> Result<Option<Distribution>> {
    let Some(factors) = lambdas.iter().map(as_gaussian).collect::<Option<Vec<_>>>() else {
        return Ok(None);
    };
    Ok(Some(Distribution::Gaussian(gaussian_product(&factors)?)))
}

fn mixtures(engine: &MessageEngine, lambdas: &[Distribution]) -> Result<Option<Distribution>> {
    let Some(factors) = lambdas
        .iter()
        .map(Distribution::as_mix_gaussians)
        .collect::<Option<Vec<_>>>()
    else {
        return Ok(None);
    };
    let product = gaussian_mixture_product(&factors)?;
    engine
        .prune(product, &engine.config().similarity.general)
        .map(Some)
}

fn discrete(_: &MessageEngine, lambdas: &[Distribution]) -> Result<Option<Distribution>> {
    let mut tables = lambdas.iter().map(|d| match d {
        Distribution::Discrete(t) => Ok(t),
        other => Err(Error::invalid(format!(
            "expected a discrete lambda, got {}",
            other.type_tag()
        ))),
    });
    let Some(first) = tables.next() else {
        return Ok(None);
    };
    let mut product = first?.clone();
    for table in tables {
        product = product.product(table?)?;
    }
    Ok(Some(Distribution::Discrete(product)))
}

/// A point mass dominates; otherwise the messages are kept as an
/// unnormalized likelihood product.
fn generic(engine: &MessageEngine, lambdas: &[Distribution]) -> Result<Option<Distribution>> {
    let mut point: Option<f64> = None;
    for d in lambdas {
        if let Distribution::Delta(delta) = d {
            match point {
                Some(p) if p != delta.point => {
                    return Err(Error::degenerate(format!(
                        "evidence at {p} and {} cannot both hold",
                        delta.point
                    )))
                }
                _ => point = Some(delta.point),
            }
        }
    }
    if let Some(p) = point {
        return Distribution::delta(p).map(Some);
    }
    if let [single] = lambdas {
        return Ok(Some(single.clone()));
    }
    let product = DistributionProduct::new(lambdas.to_vec(), true, engine.config())?;
    Ok(Some(Distribution::Product(product)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{Discrete, Gaussian, MixGaussians};

    #[test]
    fn gaussian_lambdas_multiply_in_closed_form() {
        let engine = MessageEngine::default();
        let out = engine
            .compute_lambda(&[
                Distribution::gaussian(0.0, 1.0).unwrap(),
                Distribution::Noninformative,
                Distribution::gaussian(0.0, 1.0).unwrap(),
            ])
            .unwrap();
        let (mu, sigma) = out.gaussian_params().unwrap();
        assert!(mu.abs() < 1e-12);
        assert!((sigma * sigma - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mixture_and_gaussian_combine_through_promotion() {
        let engine = MessageEngine::default();
        let mix = MixGaussians::new(vec![
            (0.5, Gaussian::new(-3.0, 1.0).unwrap()),
            (0.5, Gaussian::new(3.0, 1.0).unwrap()),
        ])
        .unwrap();
        let out = engine
            .compute_lambda(&[
                Distribution::MixtureOfGaussians(mix),
                Distribution::gaussian(3.0, 1.0).unwrap(),
            ])
            .unwrap();
        assert!(matches!(
            out,
            Distribution::MixtureOfGaussians(_) | Distribution::Gaussian(_)
        ));
        assert!(out.mean().unwrap() > 2.0);
    }

    #[test]
    fn discrete_lambdas_multiply_elementwise() {
        let engine = MessageEngine::default();
        let a = Discrete::from_probabilities(vec![0.5, 0.5]).unwrap();
        let b = Discrete::from_probabilities(vec![0.2, 0.8]).unwrap();
        let out = engine
            .compute_lambda(&[Distribution::Discrete(a), Distribution::Discrete(b)])
            .unwrap();
        match out {
            Distribution::Discrete(t) => {
                assert!((t.probability(0) - 0.2).abs() < 1e-12);
                assert!((t.probability(1) - 0.8).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mismatched_discrete_lengths_are_rejected() {
        let engine = MessageEngine::default();
        let a = Discrete::from_probabilities(vec![0.5, 0.5]).unwrap();
        let b = Discrete::from_probabilities(vec![0.2, 0.3, 0.5]).unwrap();
        let err = engine
            .compute_lambda(&[Distribution::Discrete(a), Distribution::Discrete(b)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn evidence_dominates_other_lambdas() {
        let engine = MessageEngine::default();
        let out = engine
            .compute_lambda(&[
                Distribution::gaussian(0.0, 1.0).unwrap(),
                Distribution::delta(0.5).unwrap(),
            ])
            .unwrap();
        assert_eq!(out, Distribution::delta(0.5).unwrap());
        assert!(engine
            .compute_lambda(&[
                Distribution::delta(0.5).unwrap(),
                Distribution::delta(1.5).unwrap(),
            ])
            .is_err());
    }
}
