//! A variable's prior from its model and its parents' pi messages.

use bp_common::{Error, Result};
use bp_math::{convolve, normalized, Interval, IntervalSet};
use tracing::debug;

use super::dispatch::{HelperTable, PatternElement};
use super::{as_vector, MessageEngine, PiHelper};
use crate::approximation::mixture_product::cross_terms;
use crate::approximation::Integrator;
use crate::conditional::ConditionalModel;
use crate::distribution::support::grid;
use crate::distribution::{Discrete, Distribution, Gaussian, MixGaussians, Mixture, SplineDensity};
use crate::logging::event_names;
use crate::tags::TypeTag;

/// Three-component approximation to `N(0, 1)` used to split Gaussian
/// parents before linearizing a regression. `(weight, mean, sd)`.
const UNIT_MIX: [(f64, f64, f64); 3] = [
    (0.288272103409951, -0.9418690940140162, 0.7511850694051084),
    (0.4234557931800979, 0.0, 0.6167460137184869),
    (0.288272103409951, 0.9418690940140164, 0.7511850694051082),
];

pub(crate) fn register(table: &mut HelperTable<PiHelper>) {
    use PatternElement as P;
    use TypeTag as T;

    table.register("marginal", vec![P::one(T::Marginal)], marginal);
    for model in [T::ConditionalGaussian, T::Sum, T::LinearCombination] {
        table.register(
            "linear/gaussian",
            vec![P::one(model), P::any_number(T::Gaussian)],
            linear_gaussian,
        );
        table.register(
            "linear/mix-gaussians",
            vec![P::one(model), P::any_number(T::MixGaussians)],
            linear_gaussian,
        );
    }
    table.register(
        "sum/discrete",
        vec![P::one(T::Sum), P::any_number(T::Discrete)],
        sum_discrete,
    );
    table.register(
        "sum/abstract",
        vec![P::one(T::Sum), P::any_number(T::AnyDistribution)],
        sum_abstract,
    );
    table.register(
        "linear-combination/abstract",
        vec![P::one(T::LinearCombination), P::any_number(T::AnyDistribution)],
        linear_combination_abstract,
    );
    table.register(
        "conditional-discrete/discrete",
        vec![P::one(T::ConditionalDiscrete), P::any_number(T::Discrete)],
        conditional_discrete,
    );
    table.register(
        "regression/gaussian",
        vec![P::one(T::RegressionDensity), P::any_number(T::Gaussian)],
        regression,
    );
    table.register(
        "regression/mix-gaussians",
        vec![P::one(T::RegressionDensity), P::any_number(T::MixGaussians)],
        regression,
    );
    table.register(
        "abstract/abstract",
        vec![P::one(T::AnyConditional), P::any_number(T::AnyDistribution)],
        tabulated,
    );
}

fn marginal(
    _: &MessageEngine,
    model: &ConditionalModel,
    _: &[Distribution],
) -> Result<Option<Distribution>> {
    match model {
        ConditionalModel::Marginal(prior) => Ok(Some(prior.clone())),
        _ => Ok(None),
    }
}

/// `(weights, offset, noise variance)` of a model linear in its parents.
fn linear_form(model: &ConditionalModel, parents: usize) -> Option<(Vec<f64>, f64, f64)> {
    match model {
        ConditionalModel::ConditionalGaussian(m) => {
            Some((m.weights().to_vec(), m.offset(), m.noise_variance()))
        }
        ConditionalModel::Sum { .. } => Some((vec![1.0; parents], 0.0, 0.0)),
        ConditionalModel::LinearCombination(m) => Some((m.weights().to_vec(), 0.0, 0.0)),
        _ => None,
    }
}

fn is_gaussian_family(d: &Distribution) -> bool {
    matches!(
        d,
        Distribution::Gaussian(_) | Distribution::Delta(_) | Distribution::MixtureOfGaussians(_)
    )
}

/// Closed form for linear models over Gaussian, point-mass, and Gaussian
/// mixture parents: one output component per combination of parent
/// components.
fn linear_gaussian(
    engine: &MessageEngine,
    model: &ConditionalModel,
    parents: &[Distribution],
) -> Result<Option<Distribution>> {
    let Some((weights, offset, noise)) = linear_form(model, parents.len()) else {
        return Ok(None);
    };
    if !parents.iter().all(is_gaussian_family) {
        return Ok(None);
    }
    linear_closed_form(engine, &weights, offset, noise, parents).map(Some)
}

fn linear_closed_form(
    engine: &MessageEngine,
    weights: &[f64],
    offset: f64,
    noise: f64,
    parents: &[Distribution],
) -> Result<Distribution> {
    let lists: Vec<Vec<(f64, Distribution)>> =
        parents.iter().map(Distribution::mixture_terms).collect();
    let mut components = Vec::new();
    for (_, weight, parts) in cross_terms(&lists) {
        let mut mean = offset;
        let mut variance = noise;
        for (a, part) in weights.iter().zip(&parts) {
            let (mu, sigma) = part
                .gaussian_params()
                .ok_or_else(|| Error::invalid("linear closed form needs Gaussian terms"))?;
            mean += a * mu;
            variance += a * a * sigma * sigma;
        }
        components.push((weight, Distribution::gaussian_or_delta(mean, variance)?));
    }
    match Mixture::new(components)?.into_distribution() {
        Distribution::MixtureOfGaussians(m) => engine.prune(m, &engine.config().similarity.general),
        other => Ok(other),
    }
}

/// Distribution of the sum of independent integer-valued parents.
fn sum_discrete(
    _: &MessageEngine,
    _: &ConditionalModel,
    parents: &[Distribution],
) -> Result<Option<Distribution>> {
    let Some(tables) = parents.iter().map(as_vector).collect::<Option<Vec<_>>>() else {
        return Ok(None);
    };
    let Some((first, rest)) = tables.split_first() else {
        return Ok(None);
    };
    let mut total = first.to_vec();
    for table in rest {
        total = convolve(&total, table);
    }
    Ok(Some(Distribution::Discrete(Discrete::from_probabilities(total)?)))
}

fn sum_abstract(
    engine: &MessageEngine,
    _: &ConditionalModel,
    parents: &[Distribution],
) -> Result<Option<Distribution>> {
    if parents.iter().any(|p| matches!(p, Distribution::Discrete(_))) {
        return Ok(None);
    }
    if parents.iter().any(Distribution::is_noninformative) {
        return Ok(Some(Distribution::Noninformative));
    }
    numeric_sum(engine, parents).map(Some)
}

/// Gaussian-family parents are summed in closed form; the result and any
/// remaining parents are convolved numerically on a shared grid.
fn numeric_sum(engine: &MessageEngine, parents: &[Distribution]) -> Result<Distribution> {
    let (closed, mut rest): (Vec<Distribution>, Vec<Distribution>) =
        parents.iter().cloned().partition(is_gaussian_family);
    let mut offset = 0.0;
    if !closed.is_empty() {
        let weights = vec![1.0; closed.len()];
        match linear_closed_form(engine, &weights, 0.0, 0.0, &closed)? {
            Distribution::Delta(d) => offset = d.point,
            other if rest.is_empty() => return Ok(other),
            other => rest.push(other),
        }
    }
    match rest.len() {
        0 => Distribution::delta(offset),
        1 if offset == 0.0 => Ok(rest.remove(0)),
        _ => convolution(engine, &rest, offset),
    }
}

fn convolution(engine: &MessageEngine, parts: &[Distribution], offset: f64) -> Result<Distribution> {
    let settings = &engine.config().convolution;
    let spreads: Vec<f64> = parts
        .iter()
        .map(Distribution::stddev)
        .collect::<Result<_>>()?;
    let s_max = spreads.iter().copied().fold(0.0, f64::max);
    if !(s_max > 0.0) {
        return Err(Error::degenerate("every summand has zero spread"));
    }

    // Summands much narrower than the widest only shift the result.
    let mut shift = offset;
    let mut wide = Vec::new();
    for (part, &s) in parts.iter().zip(&spreads) {
        if s / s_max > settings.min_dispersion_ratio {
            wide.push((part, s));
        } else {
            shift += part.mean()?;
        }
    }
    let s_min = wide.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let dx = 6.0 * s_min / settings.grid_minimum as f64;

    let mut left = shift;
    let mut table: Option<Vec<f64>> = None;
    for (part, _) in &wide {
        let support = part
            .effective_support(settings.support_epsilon)?
            .hull()
            .ok_or_else(|| Error::degenerate("summand has an empty support"))?;
        let steps = 1 + (support.width() / dx) as usize;
        let values: Vec<f64> = (0..=steps)
            .map(|j| part.density(support.left + j as f64 * dx))
            .collect();
        left += support.left;
        table = Some(match table {
            None => values,
            Some(acc) => {
                let raw = convolve(&acc, &values);
                normalized(&raw).ok_or_else(|| Error::degenerate("convolution lost its mass"))?
            }
        });
    }
    let table = table.ok_or_else(|| Error::degenerate("nothing left to convolve"))?;
    let x: Vec<f64> = (0..table.len()).map(|j| left + j as f64 * dx).collect();
    debug!(
        event = event_names::PI_CONVOLUTION,
        summands = parts.len(),
        convolved = wide.len(),
        grid = table.len(),
        step = dx,
        "numerical convolution"
    );
    Ok(Distribution::SplineDensity(SplineDensity::new(&x, &table)?))
}

/// Scales each parent by its coefficient, then sums.
fn linear_combination_abstract(
    engine: &MessageEngine,
    model: &ConditionalModel,
    parents: &[Distribution],
) -> Result<Option<Distribution>> {
    let ConditionalModel::LinearCombination(lc) = model else {
        return Ok(None);
    };
    if parents.iter().any(|p| matches!(p, Distribution::Discrete(_))) {
        return Ok(None);
    }
    if parents.iter().any(Distribution::is_noninformative) {
        return Ok(Some(Distribution::Noninformative));
    }
    let scaled = lc
        .weights()
        .iter()
        .zip(parents)
        .map(|(&a, p)| scale(engine, p, a))
        .collect::<Result<Vec<_>>>()?;
    numeric_sum(engine, &scaled).map(Some)
}

/// Distribution of `a·X`.
fn scale(engine: &MessageEngine, d: &Distribution, a: f64) -> Result<Distribution> {
    if a == 0.0 {
        return Distribution::delta(0.0);
    }
    if is_gaussian_family(d) {
        return linear_closed_form(engine, &[a], 0.0, 0.0, std::slice::from_ref(d));
    }
    let support = d
        .effective_support(engine.config().messages.parent_support_epsilon)?
        .hull()
        .ok_or_else(|| Error::degenerate("cannot scale a density with empty support"))?;
    let mut points: Vec<(f64, f64)> = grid(&support, engine.config().messages.tabulation_points)
        .into_iter()
        .map(|u| (a * u, d.density(u) / a.abs()))
        .collect();
    if a < 0.0 {
        points.reverse();
    }
    let (x, p): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
    Ok(Distribution::SplineDensity(SplineDensity::new(&x, &p)?))
}

/// `pi(x) = Σ_u p(x | u) Π_j pi_j(u_j)` over every parent configuration.
fn conditional_discrete(
    _: &MessageEngine,
    model: &ConditionalModel,
    parents: &[Distribution],
) -> Result<Option<Distribution>> {
    let ConditionalModel::ConditionalDiscrete(cpt) = model else {
        return Ok(None);
    };
    let Some(tables) = parents.iter().map(as_vector).collect::<Option<Vec<_>>>() else {
        return Ok(None);
    };
    for (table, &states) in tables.iter().zip(cpt.parent_dims()) {
        if table.len() != states {
            return Err(Error::DomainError {
                expected: states,
                actual: table.len(),
            });
        }
    }
    let mut pi = vec![0.0; cpt.child_states()];
    for configuration in 0..cpt.configurations() {
        let weight: f64 = cpt
            .decode(configuration)
            .iter()
            .zip(&tables)
            .map(|(&s, t)| t[s])
            .product();
        if weight == 0.0 {
            continue;
        }
        for (p, row) in pi.iter_mut().zip(cpt.row(configuration)) {
            *p += weight * row;
        }
    }
    Ok(Some(Distribution::Discrete(Discrete::from_probabilities(pi)?)))
}

/// Linearizes the regression around each combination of parent
/// components. Gaussian parents are first split with [`UNIT_MIX`].
fn regression(
    engine: &MessageEngine,
    model: &ConditionalModel,
    parents: &[Distribution],
) -> Result<Option<Distribution>> {
    let ConditionalModel::RegressionDensity(density) = model else {
        return Ok(None);
    };
    let mut lists = Vec::with_capacity(parents.len());
    for parent in parents {
        let terms = match parent {
            Distribution::Gaussian(g) => UNIT_MIX
                .iter()
                .map(|&(w, m, s)| {
                    Gaussian::new(g.mu() + g.sigma() * m, g.sigma() * s)
                        .map(|c| (w, Distribution::Gaussian(c)))
                })
                .collect::<Result<Vec<_>>>()?,
            Distribution::Delta(_) | Distribution::MixtureOfGaussians(_) => parent.mixture_terms(),
            _ => return Ok(None),
        };
        lists.push(terms);
    }

    let regression = density.model();
    let mut components = Vec::new();
    for (_, weight, parts) in cross_terms(&lists) {
        let params = parts
            .iter()
            .map(Distribution::gaussian_params)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::invalid("regression terms must be Gaussian"))?;
        let means: Vec<f64> = params.iter().map(|(m, _)| *m).collect();
        let gradient = regression.gradient(&means);
        if gradient.len() != means.len() {
            return Err(Error::DomainError {
                expected: means.len(),
                actual: gradient.len(),
            });
        }
        let variance = density.noise_variance()
            + params
                .iter()
                .zip(&gradient)
                .map(|((_, s), g)| s * s * g * g)
                .sum::<f64>();
        let mean = regression.evaluate(&means);
        if !mean.is_finite() || !variance.is_finite() {
            return Err(Error::Numerical(format!(
                "regression linearization produced mean {mean}, variance {variance}"
            )));
        }
        components.push((weight, Gaussian::from_variance(mean, variance)?));
    }
    let mixture = MixGaussians::new(components)?;
    engine
        .prune(mixture, &engine.config().similarity.regression)
        .map(Some)
}

/// Last resort: tabulate `∫ p(x | u) Π pi_j(u_j) du` on a grid over the
/// child's range, interpolate, and fit a mixture.
fn tabulated(
    engine: &MessageEngine,
    model: &ConditionalModel,
    parents: &[Distribution],
) -> Result<Option<Distribution>> {
    let origin = vec![0.0; parents.len()];
    if model.child_states().is_some() || model.deterministic_value(&origin).is_some() {
        return Ok(None);
    }
    if parents.iter().any(Distribution::is_noninformative) {
        return Ok(Some(Distribution::Noninformative));
    }
    let settings = &engine.config().messages;

    let supports = parents
        .iter()
        .map(|p| match p {
            Distribution::Delta(_) | Distribution::Discrete(_) => Ok(IntervalSet::empty()),
            other => other.effective_support(settings.parent_support_epsilon),
        })
        .collect::<Result<Vec<_>>>()?;

    let Some(range) = child_range(model, parents, &supports, settings.child_support_epsilon)? else {
        return Ok(None);
    };
    if !(range.width() > 0.0) {
        return Err(Error::degenerate("child range collapsed to a point"));
    }

    let integrator = engine.integrator();
    let xs = grid(&range, settings.tabulation_points);
    let mut ps = Vec::with_capacity(xs.len());
    for &x in &xs {
        let value = expect_over_parents(integrator, parents, &supports, &|u: &[f64]| {
            model.conditional_density(x, u).unwrap_or(0.0)
        })?;
        ps.push(value);
    }
    debug!(
        event = event_names::PI_TABULATED,
        model = %model.type_tag(),
        left = range.left,
        right = range.right,
        points = xs.len(),
        "tabulated prior by nested integration"
    );
    let spline = Distribution::SplineDensity(SplineDensity::new(&xs, &ps)?);
    engine
        .approximate(&spline, settings.posterior_fit_tolerance)
        .map(Some)
}

/// Hull of the conditional supports at the corners and centre of the
/// parents' supports.
fn child_range(
    model: &ConditionalModel,
    parents: &[Distribution],
    supports: &[IntervalSet],
    epsilon: f64,
) -> Result<Option<Interval>> {
    let mut probes: Vec<Vec<f64>> = vec![Vec::new()];
    for (parent, support) in parents.iter().zip(supports) {
        let points: Vec<f64> = match parent {
            Distribution::Delta(d) => vec![d.point],
            Distribution::Discrete(t) => (0..t.len()).map(|i| i as f64).collect(),
            _ => {
                let hull = support
                    .hull()
                    .ok_or_else(|| Error::degenerate("parent support is empty"))?;
                vec![hull.left, hull.midpoint(), hull.right]
            }
        };
        probes = probes
            .into_iter()
            .flat_map(|prefix| {
                points.iter().map(move |&p| {
                    let mut next = prefix.clone();
                    next.push(p);
                    next
                })
            })
            .collect();
    }

    let mut range: Option<Interval> = None;
    for probe in &probes {
        let Some(piece) = model.conditional_support(probe, epsilon)? else {
            return Ok(None);
        };
        range = Some(match range {
            None => piece,
            Some(r) => Interval::new(r.left.min(piece.left), r.right.max(piece.right)),
        });
    }
    Ok(range)
}

/// `E[f(U)]` for independent parents: point masses are substituted,
/// discrete parents summed over, and the rest integrated over `supports`.
pub(crate) fn expect_over_parents<F>(
    integrator: &Integrator,
    parents: &[Distribution],
    supports: &[IntervalSet],
    f: &F,
) -> Result<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut prefix = Vec::with_capacity(parents.len());
    nested(integrator, parents, supports, &mut prefix, f)
}

fn nested<F>(
    integrator: &Integrator,
    parents: &[Distribution],
    supports: &[IntervalSet],
    prefix: &mut Vec<f64>,
    f: &F,
) -> Result<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let k = prefix.len();
    let Some(parent) = parents.get(k) else {
        return Ok(f(prefix));
    };
    match parent {
        Distribution::Delta(d) => {
            prefix.push(d.point);
            let value = nested(integrator, parents, supports, prefix, f);
            prefix.pop();
            value
        }
        Distribution::Discrete(t) => {
            let mut total = 0.0;
            for (i, &p) in t.probabilities().iter().enumerate() {
                if p == 0.0 {
                    continue;
                }
                prefix.push(i as f64);
                let value = nested(integrator, parents, supports, prefix, f);
                prefix.pop();
                total += p * value?;
            }
            Ok(total)
        }
        other => {
            let mut failure = None;
            let value = integrator.integrate_with_retry(
                |u| {
                    let density = other.density(u);
                    if density == 0.0 {
                        return 0.0;
                    }
                    prefix.push(u);
                    let inner = nested(integrator, parents, supports, prefix, f);
                    prefix.pop();
                    match inner {
                        Ok(v) => density * v,
                        Err(e) => {
                            failure.get_or_insert(e);
                            0.0
                        }
                    }
                },
                &supports[k],
            );
            match failure {
                Some(e) => Err(e),
                None => value,
            }
        }
    }
}
