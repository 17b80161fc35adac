//! Lambda message from a variable to one of its parents.
//!
//! The message is a likelihood over the recipient's value: the child's
//! lambda integrated against the model, with every other parent
//! marginalized out under its pi message. Likelihoods carry no
//! normalization, so results are scaled freely.

use std::cell::RefCell;

use bp_common::{Error, Result};
use bp_math::{convolve, correlate_valid, IntervalSet};
use tracing::debug;

use super::dispatch::{HelperTable, PatternElement};
use super::pi::expect_over_parents;
use super::{as_vector, LambdaMessageHelper, LambdaMessageRequest, MessageEngine};
use crate::approximation::mixture_product::cross_terms;
use crate::conditional::ConditionalModel;
use crate::distribution::support::{grid, search_effective_support};
use crate::distribution::{Discrete, Distribution, Mixture, SplineDensity};
use crate::logging::event_names;
use crate::tags::TypeTag;

pub(crate) fn register(table: &mut HelperTable<LambdaMessageHelper>) {
    use PatternElement as P;
    use TypeTag as T;

    for model in [T::ConditionalGaussian, T::Sum, T::LinearCombination] {
        table.register(
            "linear/gaussian",
            vec![P::one(model), P::one(T::Gaussian), P::any_number(T::Gaussian)],
            linear_gaussian,
        );
        table.register(
            "linear/mix-gaussians",
            vec![
                P::one(model),
                P::one(T::MixGaussians),
                P::any_number(T::MixGaussians),
            ],
            linear_gaussian,
        );
    }
    table.register(
        "conditional-discrete/abstract",
        vec![
            P::one(T::ConditionalDiscrete),
            P::one(T::AnyDistribution),
            P::any_number(T::Discrete),
        ],
        conditional_discrete,
    );
    table.register(
        "sum/discrete",
        vec![P::one(T::Sum), P::one(T::Discrete), P::any_number(T::Discrete)],
        sum_discrete,
    );
    table.register(
        "abstract/abstract",
        vec![
            P::one(T::AnyConditional),
            P::one(T::AnyDistribution),
            P::any_number(T::AnyDistribution),
        ],
        tabulated,
    );
}

/// `(weights, offset, noise variance)` of a model linear in its parents.
fn linear_form(model: &ConditionalModel) -> Option<(Vec<f64>, f64, f64)> {
    match model {
        ConditionalModel::ConditionalGaussian(m) => {
            Some((m.weights().to_vec(), m.offset(), m.noise_variance()))
        }
        ConditionalModel::Sum { parents } => Some((vec![1.0; *parents], 0.0, 0.0)),
        ConditionalModel::LinearCombination(m) => Some((m.weights().to_vec(), 0.0, 0.0)),
        _ => None,
    }
}

/// For `x = b + Σ a_j u_j + noise` and a Gaussian lambda `N(m, s²)` on `x`,
/// the message on `u_t` is Gaussian with mean
/// `(m - b - Σ_{j≠t} a_j μ_j) / a_t` and variance
/// `(s² + σ² + Σ_{j≠t} a_j² s_j²) / a_t²`. Mixture lambdas and parents
/// give one such term per combination of components.
fn linear_gaussian(
    _: &MessageEngine,
    request: &LambdaMessageRequest<'_>,
) -> Result<Option<Distribution>> {
    let Some((weights, offset, noise)) = linear_form(request.model) else {
        return Ok(None);
    };
    let a_t = weights[request.target];
    if a_t == 0.0 {
        return Ok(Some(Distribution::Noninformative));
    }
    let other_weights: Vec<f64> = weights
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != request.target)
        .map(|(_, a)| *a)
        .collect();

    let mut lists = vec![request.lambda.mixture_terms()];
    lists.extend(request.others().map(Distribution::mixture_terms));

    let mut components = Vec::new();
    for (_, weight, parts) in cross_terms(&lists) {
        let mut params = parts.iter().map(Distribution::gaussian_params);
        let Some(Some((m, s))) = params.next() else {
            return Ok(None);
        };
        let mut mean = m - offset;
        let mut variance = s * s + noise;
        for (a, p) in other_weights.iter().zip(params) {
            let Some((mu, sigma)) = p else {
                return Ok(None);
            };
            mean -= a * mu;
            variance += a * a * sigma * sigma;
        }
        components.push((
            weight,
            Distribution::gaussian_or_delta(mean / a_t, variance / (a_t * a_t))?,
        ));
    }
    Ok(Some(Mixture::new(components)?.into_distribution()))
}

/// `lambda(u_t = i) = Σ_x λ(x) Σ_{other configurations} p(x | u) Π_{j≠t} pi_j(u_j)`.
fn conditional_discrete(
    _: &MessageEngine,
    request: &LambdaMessageRequest<'_>,
) -> Result<Option<Distribution>> {
    let ConditionalModel::ConditionalDiscrete(cpt) = request.model else {
        return Ok(None);
    };
    let lambda: Vec<f64> = (0..cpt.child_states())
        .map(|x| request.lambda.density(x as f64))
        .collect();

    let mut pis: Vec<Option<&[f64]>> = Vec::with_capacity(request.parents.len());
    for (j, parent) in request.parents.iter().enumerate() {
        match parent {
            _ if j == request.target => pis.push(None),
            Some(d) => {
                let Some(table) = as_vector(d) else {
                    return Ok(None);
                };
                if table.len() != cpt.parent_dims()[j] {
                    return Err(Error::DomainError {
                        expected: cpt.parent_dims()[j],
                        actual: table.len(),
                    });
                }
                pis.push(Some(table));
            }
            None => return Ok(None),
        }
    }

    let mut message = vec![0.0; cpt.parent_dims()[request.target]];
    for configuration in 0..cpt.configurations() {
        let states = cpt.decode(configuration);
        let weight: f64 = states
            .iter()
            .zip(&pis)
            .filter_map(|(&s, p)| p.map(|t| t[s]))
            .product();
        if weight == 0.0 {
            continue;
        }
        let likelihood: f64 = cpt
            .row(configuration)
            .iter()
            .zip(&lambda)
            .map(|(p, l)| p * l)
            .sum();
        message[states[request.target]] += weight * likelihood;
    }
    Ok(Some(Distribution::Discrete(Discrete::from_probabilities(
        message,
    )?)))
}

/// `lambda(u_t = i) = Σ_k c[k] λ(i + k)` where `c` is the distribution of
/// the sum of the other parents.
fn sum_discrete(
    _: &MessageEngine,
    request: &LambdaMessageRequest<'_>,
) -> Result<Option<Distribution>> {
    let Some(lambda) = as_vector(request.lambda) else {
        return Ok(None);
    };
    let Some(others) = request.others().map(as_vector).collect::<Option<Vec<_>>>() else {
        return Ok(None);
    };
    let mut rest = vec![1.0];
    for table in others {
        rest = convolve(&rest, table);
    }
    let message = correlate_valid(lambda, &rest);
    if message.is_empty() {
        return Err(Error::invalid(format!(
            "child has {} states but the other parents already span {}",
            lambda.len(),
            rest.len()
        )));
    }
    Ok(Some(Distribution::Discrete(Discrete::from_probabilities(
        message,
    )?)))
}

/// Last resort: tabulate `λ(u_t) = E_{u_-t}[∫ λ(x) p(x | u) dx]` over a
/// window found by searching the recipient's axis, interpolate, and fit a
/// mixture.
fn tabulated(
    engine: &MessageEngine,
    request: &LambdaMessageRequest<'_>,
) -> Result<Option<Distribution>> {
    let model = request.model;
    if model.child_states().is_some() || matches!(request.lambda, Distribution::Discrete(_)) {
        return Ok(None);
    }
    let origin = vec![0.0; request.parents.len()];
    let deterministic = model.deterministic_value(&origin).is_some();
    if deterministic && matches!(request.lambda, Distribution::Delta(_)) {
        return Ok(None);
    }
    if request.others().any(Distribution::is_noninformative) {
        return Ok(Some(Distribution::Noninformative));
    }
    let settings = &engine.config().messages;
    let integrator = engine.integrator();

    let others: Vec<Distribution> = request.others().cloned().collect();
    let supports = others
        .iter()
        .map(|p| match p {
            Distribution::Delta(_) | Distribution::Discrete(_) => Ok(IntervalSet::empty()),
            other => other.effective_support(settings.parent_support_epsilon),
        })
        .collect::<Result<Vec<_>>>()?;
    let lambda_support = match request.lambda {
        Distribution::Delta(_) => IntervalSet::empty(),
        other => other.effective_support(settings.child_support_epsilon)?,
    };

    // `p(x | u)` integrated against the child's lambda at a full parent
    // configuration.
    let child_likelihood = |u: &[f64]| -> Result<f64> {
        if let Some(x) = model.deterministic_value(u) {
            return Ok(request.lambda.density(x));
        }
        match request.lambda {
            Distribution::Delta(d) => Ok(model.conditional_density(d.point, u).unwrap_or(0.0)),
            lambda => integrator.integrate_with_retry(
                |x| {
                    let l = lambda.density(x);
                    if l == 0.0 {
                        return 0.0;
                    }
                    l * model.conditional_density(x, u).unwrap_or(0.0)
                },
                &lambda_support,
            ),
        }
    };

    let failure = RefCell::new(None);
    let message_at = |t: f64| -> f64 {
        let value = expect_over_parents(integrator, &others, &supports, &|rest: &[f64]| {
            let mut u = rest.to_vec();
            u.insert(request.target, t);
            match child_likelihood(&u) {
                Ok(v) => v,
                Err(e) => {
                    failure.borrow_mut().get_or_insert(e);
                    0.0
                }
            }
        });
        match value {
            Ok(v) => v,
            Err(e) => {
                failure.borrow_mut().get_or_insert(e);
                0.0
            }
        }
    };

    // A coarse pass over the whole window, then a fine pass inside it.
    let mut range =
        IntervalSet::single(-settings.lambda_search_radius, settings.lambda_search_radius);
    for _ in 0..2 {
        let found = search_effective_support(
            &message_at,
            &range,
            settings.child_support_epsilon,
            settings.lambda_search_points,
        );
        if let Some(e) = failure.borrow_mut().take() {
            return Err(e);
        }
        range = found?;
    }
    let hull = range
        .hull()
        .ok_or_else(|| Error::SupportUndefined("lambda message vanished on the search window".to_string()))?;
    if !(hull.width() > 0.0) {
        return Err(Error::degenerate("lambda message collapsed to a point"));
    }

    let xs = grid(&hull, settings.tabulation_points);
    let ps: Vec<f64> = xs.iter().map(|&t| message_at(t)).collect();
    if let Some(e) = failure.borrow_mut().take() {
        return Err(e);
    }
    debug!(
        event = event_names::LAMBDA_TABULATED,
        model = %model.type_tag(),
        parent = request.target,
        left = hull.left,
        right = hull.right,
        points = xs.len(),
        "tabulated lambda message by nested integration"
    );
    let spline = Distribution::SplineDensity(SplineDensity::new(&xs, &ps)?);
    engine
        .approximate(&spline, settings.posterior_fit_tolerance)
        .map(Some)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::conditional::{
        ConditionalDiscrete as Cpt, ConditionalGaussian, LinearCombination, RegressionDensity,
        RegressionModel,
    };

    #[derive(Debug)]
    struct Affine;

    impl RegressionModel for Affine {
        fn input_dimension(&self) -> usize {
            1
        }
        fn evaluate(&self, inputs: &[f64]) -> f64 {
            2.0 * inputs[0] + 1.0
        }
        fn gradient(&self, _: &[f64]) -> Vec<f64> {
            vec![2.0]
        }
    }

    fn normal(mu: f64, sigma: f64) -> Distribution {
        Distribution::gaussian(mu, sigma).unwrap()
    }

    fn table(p: &[f64]) -> Distribution {
        Distribution::Discrete(Discrete::from_probabilities(p.to_vec()).unwrap())
    }

    #[test]
    fn noninformative_lambda_sends_nothing() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::Sum { parents: 2 };
        let msg = engine
            .compute_lambda_message(&model, &Distribution::Noninformative, &[None, Some(normal(0.0, 1.0))])
            .unwrap();
        assert_eq!(msg, Distribution::Noninformative);
    }

    #[test]
    fn linear_gaussian_inverts_the_model() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::ConditionalGaussian(
            ConditionalGaussian::new(vec![2.0, 1.0], 1.0, 0.5).unwrap(),
        );
        // x = 1 + 2 u0 + u1 + e, lambda on x is N(5, 1), u1 ~ N(1, 1).
        let msg = engine
            .compute_lambda_message(&model, &normal(5.0, 1.0), &[None, Some(normal(1.0, 1.0))])
            .unwrap();
        let (mu, sigma) = msg.gaussian_params().unwrap();
        assert!((mu - 1.5).abs() < 1e-12);
        assert!((sigma * sigma - 2.5 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn evidence_on_a_sum_pins_the_parent() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::Sum { parents: 2 };
        let msg = engine
            .compute_lambda_message(
                &model,
                &Distribution::delta(3.0).unwrap(),
                &[Some(Distribution::delta(1.0).unwrap()), None],
            )
            .unwrap();
        assert_eq!(msg, Distribution::delta(2.0).unwrap());
    }

    #[test]
    fn zero_coefficient_is_noninformative() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::LinearCombination(LinearCombination::new(vec![0.0, 1.0]).unwrap());
        let msg = engine
            .compute_lambda_message(&model, &normal(0.0, 1.0), &[None, Some(normal(0.0, 1.0))])
            .unwrap();
        assert_eq!(msg, Distribution::Noninformative);
    }

    #[test]
    fn conditional_discrete_with_discrete_lambda() {
        let engine = MessageEngine::default();
        let cpt = Cpt::new(vec![2], 2, vec![0.9, 0.1, 0.2, 0.8]).unwrap();
        let msg = engine
            .compute_lambda_message(
                &ConditionalModel::ConditionalDiscrete(cpt),
                &table(&[0.0, 1.0]),
                &[None],
            )
            .unwrap();
        // Unnormalized (0.1, 0.8).
        assert!((msg.density(0.0) - 0.1 / 0.9).abs() < 1e-12);
        assert!((msg.density(1.0) - 0.8 / 0.9).abs() < 1e-12);
    }

    #[test]
    fn conditional_discrete_marginalizes_other_parents() {
        let engine = MessageEngine::default();
        // Child is the AND of two binary parents.
        let cpt = Cpt::new(
            vec![2, 2],
            2,
            vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
        let msg = engine
            .compute_lambda_message(
                &ConditionalModel::ConditionalDiscrete(cpt),
                &Distribution::delta(1.0).unwrap(),
                &[Some(table(&[0.5, 0.5])), None],
            )
            .unwrap();
        assert!((msg.density(0.0)).abs() < 1e-12);
        assert!((msg.density(1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sum_of_discrete_correlates() {
        let engine = MessageEngine::default();
        let die = table(&[1.0; 6]);
        // Two dice summed to 7 (index 5 of 0..=10 when faces are 0..=5).
        let mut lambda = vec![0.0; 11];
        lambda[5] = 1.0;
        let msg = engine
            .compute_lambda_message(
                &ConditionalModel::Sum { parents: 2 },
                &table(&lambda),
                &[None, Some(die)],
            )
            .unwrap();
        for face in 0..6 {
            assert!((msg.density(face as f64) - 1.0 / 6.0).abs() < 1e-12);
        }
    }

    #[test]
    fn regression_lambda_is_tabulated_and_fitted() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::RegressionDensity(
            RegressionDensity::new(Arc::new(Affine), 0.25).unwrap(),
        );
        // 2u + 1 ~ N(3, 0.25 + 0.25), so u ~ N(1, 0.125).
        let msg = engine
            .compute_lambda_message(&model, &normal(3.0, 0.5), &[None])
            .unwrap();
        assert!((msg.mean().unwrap() - 1.0).abs() < 1e-2);
        assert!((msg.variance().unwrap() - 0.125).abs() < 1e-2);
    }

    #[test]
    fn spline_lambda_falls_back_to_tabulation() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::ConditionalGaussian(
            ConditionalGaussian::new(vec![1.0], 0.0, 1.0).unwrap(),
        );
        let x: Vec<f64> = (0..=100).map(|i| 2.0 * i as f64 / 100.0).collect();
        let uniform = Distribution::SplineDensity(SplineDensity::new(&x, &vec![1.0; 101]).unwrap());
        // P(0 <= x <= 2 | u), symmetric about 1 with variance 1/3 + 1.
        let msg = engine
            .compute_lambda_message(&model, &uniform, &[None])
            .unwrap();
        assert!((msg.mean().unwrap() - 1.0).abs() < 5e-2);
        assert!((msg.variance().unwrap() - 4.0 / 3.0).abs() < 0.1);
    }

    #[test]
    fn fallback_integrates_over_other_parents() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::RegressionDensity(
            RegressionDensity::new(Arc::new(Sum2), 0.5).unwrap(),
        );
        // x = u0 + u1 + e with u1 ~ N(1, 1) and x observed at 4.
        let msg = engine
            .compute_lambda_message(
                &model,
                &Distribution::delta(4.0).unwrap(),
                &[None, Some(normal(1.0, 1.0))],
            )
            .unwrap();
        assert!((msg.mean().unwrap() - 3.0).abs() < 2e-2);
        assert!((msg.variance().unwrap() - 1.5).abs() < 5e-2);
    }

    #[derive(Debug)]
    struct Sum2;

    impl RegressionModel for Sum2 {
        fn input_dimension(&self) -> usize {
            2
        }
        fn evaluate(&self, inputs: &[f64]) -> f64 {
            inputs[0] + inputs[1]
        }
        fn gradient(&self, _: &[f64]) -> Vec<f64> {
            vec![1.0, 1.0]
        }
    }

    #[test]
    fn noninformative_other_parent_sends_nothing() {
        let engine = MessageEngine::default();
        let model = ConditionalModel::RegressionDensity(
            RegressionDensity::new(Arc::new(Sum2), 0.5).unwrap(),
        );
        let msg = engine
            .compute_lambda_message(
                &model,
                &normal(0.0, 1.0),
                &[Some(Distribution::Noninformative), None],
            )
            .unwrap();
        assert_eq!(msg, Distribution::Noninformative);
    }
}
