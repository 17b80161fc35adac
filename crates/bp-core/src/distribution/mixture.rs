//! Finite mixtures: Gaussian-only and general.

use bp_common::{Error, Result};
use bp_config::SimilarityThresholds;
use bp_math::{log_sum_exp, IntervalSet};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::gaussian::{check_epsilon, Gaussian};
use super::Distribution;

fn default_gamma() -> f64 {
    1.0
}

/// One weighted Gaussian inside a [`MixGaussians`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixComponent {
    pub weight: f64,
    pub gaussian: Gaussian,
    /// Dirichlet concentration for the mixing proportion.
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

impl MixComponent {
    pub fn new(weight: f64, gaussian: Gaussian) -> Self {
        MixComponent {
            weight,
            gaussian,
            gamma: 1.0,
        }
    }
}

fn validate_weights<'a>(weights: impl Iterator<Item = &'a f64>) -> Result<f64> {
    let mut total = 0.0;
    for &w in weights {
        if !(w >= 0.0) || !w.is_finite() {
            return Err(Error::invalid(format!(
                "mixing proportions must be finite and nonnegative, got {w}"
            )));
        }
        total += w;
    }
    if !(total > 0.0) {
        return Err(Error::degenerate("mixing proportions sum to zero"));
    }
    Ok(total)
}

/// Mixture of Gaussians with mixing proportions summing to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixGaussians {
    components: Vec<MixComponent>,
}

impl MixGaussians {
    /// Normalizes the weights; zero-weight components are dropped.
    pub fn new(components: Vec<(f64, Gaussian)>) -> Result<Self> {
        MixGaussians::from_components(
            components
                .into_iter()
                .map(|(w, g)| MixComponent::new(w, g))
                .collect(),
        )
    }

    pub fn from_components(components: Vec<MixComponent>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::degenerate("mixture has no components"));
        }
        let total = validate_weights(components.iter().map(|c| &c.weight))?;
        let components = components
            .into_iter()
            .filter(|c| c.weight > 0.0)
            .map(|c| MixComponent {
                weight: c.weight / total,
                ..c
            })
            .collect();
        Ok(MixGaussians { components })
    }

    pub fn single(gaussian: Gaussian) -> Self {
        MixGaussians {
            components: vec![MixComponent::new(1.0, gaussian)],
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[MixComponent] {
        &self.components
    }

    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|c| c.weight).collect()
    }

    pub fn component(&self, i: usize) -> &Gaussian {
        &self.components[i].gaussian
    }

    pub fn density(&self, x: f64) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.gaussian.density(x))
            .sum()
    }

    fn ln_weighted(&self, x: f64) -> Vec<f64> {
        self.components
            .iter()
            .map(|c| c.weight.ln() + c.gaussian.ln_density(x))
            .collect()
    }

    /// Log density, finite wherever `x` is.
    pub fn ln_density(&self, x: f64) -> f64 {
        log_sum_exp(&self.ln_weighted(x))
    }

    /// Posterior probability that `x` came from component `i`.
    ///
    /// Computed from log densities, so it stays defined where every
    /// component density underflows: far in a tail the dominant component
    /// takes responsibility one. Zero only when the log-sum itself is not
    /// finite, as at an infinite `x`.
    pub fn responsibility(&self, i: usize, x: f64) -> f64 {
        let terms = self.ln_weighted(x);
        let total = log_sum_exp(&terms);
        if !total.is_finite() {
            return 0.0;
        }
        (terms[i] - total).exp()
    }

    pub fn responsibilities(&self, x: f64) -> Vec<f64> {
        let terms = self.ln_weighted(x);
        let total = log_sum_exp(&terms);
        if !total.is_finite() {
            return vec![0.0; terms.len()];
        }
        terms.iter().map(|t| (t - total).exp()).collect()
    }

    pub fn mean(&self) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.gaussian.mu())
            .sum()
    }

    /// Law of total variance.
    pub fn variance(&self) -> f64 {
        let mean = self.mean();
        self.components
            .iter()
            .map(|c| c.weight * (c.gaussian.variance() + (c.gaussian.mu() - mean).powi(2)))
            .sum()
    }

    /// Union of the components' central intervals.
    pub fn effective_support(&self, epsilon: f64) -> Result<IntervalSet> {
        check_epsilon(epsilon)?;
        let intervals = self
            .components
            .iter()
            .map(|c| c.gaussian.effective_support(epsilon))
            .collect::<Result<IntervalSet>>()?;
        Ok(intervals.union_merge())
    }

    /// Drops light components, then near-duplicates, then renormalizes.
    ///
    /// Fails only when nothing survives.
    pub fn simplify(&self, min_weight: f64, thresholds: &SimilarityThresholds) -> Result<MixGaussians> {
        let heavy: Vec<MixComponent> = self
            .components
            .iter()
            .filter(|c| c.weight >= min_weight)
            .copied()
            .collect();
        if heavy.is_empty() {
            return Err(Error::degenerate(format!(
                "every component weighs less than {min_weight}"
            )));
        }
        let duplicates = find_duplicates(&heavy, thresholds);
        let kept: Vec<MixComponent> = heavy
            .into_iter()
            .zip(duplicates)
            .filter_map(|(c, dup)| (!dup).then_some(c))
            .collect();
        MixGaussians::from_components(kept)
    }

    /// A single component becomes a plain Gaussian.
    pub fn into_distribution(self) -> Distribution {
        if self.components.len() == 1 {
            Distribution::Gaussian(self.components[0].gaussian)
        } else {
            Distribution::MixtureOfGaussians(self)
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for c in &self.components {
            cumulative += c.weight;
            if u < cumulative {
                return c.gaussian.sample(rng);
            }
        }
        self.components[self.components.len() - 1].gaussian.sample(rng)
    }
}

/// Flags component `i` when some later component is close in both location
/// and scale.
fn find_duplicates(components: &[MixComponent], thresholds: &SimilarityThresholds) -> Vec<bool> {
    let mut flagged = vec![false; components.len()];
    for i in 0..components.len() {
        let gi = &components[i].gaussian;
        for gj in components[i + 1..].iter().map(|c| &c.gaussian) {
            if gi.sigma() == 0.0 || gj.sigma() == 0.0 {
                continue;
            }
            let scale = (1.0 / (1.0 / gi.variance() + 1.0 / gj.variance())).sqrt();
            let mean_close = (gi.mu() - gj.mu()).abs() / scale < thresholds.mean;
            let ratio = gi.sigma() / gj.sigma();
            let scale_close = ratio > 1.0 - thresholds.ratio && ratio < 1.0 + thresholds.ratio;
            if mean_close && scale_close {
                flagged[i] = true;
                break;
            }
        }
    }
    flagged
}

/// Weighted mixture of arbitrary distributions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mixture {
    weights: Vec<f64>,
    components: Vec<Distribution>,
}

impl Mixture {
    /// Normalizes the weights and flattens nested mixtures.
    pub fn new(components: Vec<(f64, Distribution)>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::degenerate("mixture has no components"));
        }
        let total = validate_weights(components.iter().map(|(w, _)| w))?;
        let mut weights = Vec::with_capacity(components.len());
        let mut flat = Vec::with_capacity(components.len());
        for (w, d) in components {
            if w == 0.0 {
                continue;
            }
            for (inner_w, inner) in d.mixture_terms() {
                weights.push(w / total * inner_w);
                flat.push(inner);
            }
        }
        Ok(Mixture {
            weights,
            components: flat,
        })
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn components(&self) -> &[Distribution] {
        &self.components
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &Distribution)> {
        self.weights.iter().copied().zip(self.components.iter())
    }

    pub fn density(&self, x: f64) -> f64 {
        self.iter().map(|(w, d)| w * d.density(x)).sum()
    }

    pub fn responsibility(&self, i: usize, x: f64) -> f64 {
        let total = self.density(x);
        if !(total > 0.0) {
            return 0.0;
        }
        self.weights[i] * self.components[i].density(x) / total
    }

    pub fn mean(&self) -> Result<f64> {
        let mut sum = 0.0;
        for (w, d) in self.iter() {
            sum += w * d.mean()?;
        }
        Ok(sum)
    }

    pub fn variance(&self) -> Result<f64> {
        let mean = self.mean()?;
        let mut sum = 0.0;
        for (w, d) in self.iter() {
            sum += w * (d.variance()? + (d.mean()? - mean).powi(2));
        }
        Ok(sum)
    }

    pub fn effective_support(&self, epsilon: f64) -> Result<IntervalSet> {
        check_epsilon(epsilon)?;
        let mut all = IntervalSet::empty();
        for d in &self.components {
            all = all.union(&d.effective_support(epsilon)?);
        }
        Ok(all)
    }

    /// `Some` when every component is Gaussian.
    pub fn to_mix_gaussians(&self) -> Option<MixGaussians> {
        let components = self
            .iter()
            .map(|(w, d)| match d {
                Distribution::Gaussian(g) => Some(MixComponent::new(w, *g)),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        MixGaussians::from_components(components).ok()
    }

    /// Collapses a singleton and narrows all-Gaussian mixtures.
    pub fn into_distribution(self) -> Distribution {
        if self.components.len() == 1 {
            let mut components = self.components;
            return components.remove(0);
        }
        match self.to_mix_gaussians() {
            Some(mix) => Distribution::MixtureOfGaussians(mix),
            None => Distribution::GenericMixture(self),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for (w, d) in self.iter() {
            cumulative += w;
            if u < cumulative {
                return d.sample(rng);
            }
        }
        self.components[self.components.len() - 1].sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(mu: f64, sigma: f64) -> Gaussian {
        Gaussian::new(mu, sigma).unwrap()
    }

    #[test]
    fn weights_are_normalized() {
        let mix = MixGaussians::new(vec![(2.0, g(0.0, 1.0)), (6.0, g(3.0, 1.0))]).unwrap();
        assert_eq!(mix.weights(), vec![0.25, 0.75]);
        assert!(MixGaussians::new(vec![]).is_err());
        assert!(MixGaussians::new(vec![(0.0, g(0.0, 1.0))]).is_err());
    }

    #[test]
    fn responsibilities_sum_to_one() {
        let mix = MixGaussians::new(vec![
            (0.3, g(-2.0, 0.5)),
            (0.3, g(0.0, 1.0)),
            (0.4, g(4.0, 2.0)),
        ])
        .unwrap();
        for x in [-5.0, -1.0, 0.3, 2.5, 9.0] {
            let total: f64 = mix.responsibilities(x).iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn responsibility_far_in_tail_is_finite() {
        let mix = MixGaussians::new(vec![(0.5, g(0.0, 1e-3)), (0.5, g(1.0, 1e-3))]).unwrap();
        // Both densities underflow; the log-domain ratio still resolves.
        let r = mix.responsibility(1, 50.0);
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(mix.density(50.0), 0.0);
        let all = mix.responsibilities(-50.0);
        assert!((all[0] - 1.0).abs() < 1e-12 && all[1] < 1e-12);
        // Underflow everywhere collapses to zero rather than NaN.
        let r = mix.responsibility(0, f64::INFINITY);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn moments_by_total_variance() {
        let mix = MixGaussians::new(vec![(0.5, g(-1.0, 1.0)), (0.5, g(1.0, 1.0))]).unwrap();
        assert_eq!(mix.mean(), 0.0);
        assert!((mix.variance() - 2.0).abs() < 1e-15);
    }

    #[test]
    fn simplify_drops_light_and_duplicate_components() {
        let mix = MixGaussians::new(vec![
            (0.001, g(10.0, 1.0)),
            (0.4995, g(0.0, 1.0)),
            (0.4995, g(0.1, 1.05)),
        ])
        .unwrap();
        let pruned = mix
            .simplify(0.005, &SimilarityThresholds::general())
            .unwrap();
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned.weights(), vec![1.0]);
        assert_eq!(pruned.component(0).mu(), 0.1);
    }

    #[test]
    fn simplify_keeps_distinct_components() {
        let mix = MixGaussians::new(vec![(0.5, g(0.0, 1.0)), (0.5, g(0.0, 3.0))]).unwrap();
        let pruned = mix
            .simplify(0.005, &SimilarityThresholds::general())
            .unwrap();
        assert_eq!(pruned.len(), 2);
    }

    #[test]
    fn simplify_fails_when_everything_is_light() {
        let mix = MixGaussians::new(vec![(0.5, g(0.0, 1.0)), (0.5, g(5.0, 1.0))]).unwrap();
        assert!(matches!(
            mix.simplify(0.9, &SimilarityThresholds::general()),
            Err(Error::DegenerateSupport(_))
        ));
    }

    #[test]
    fn generic_mixture_flattens_and_narrows() {
        let inner = MixGaussians::new(vec![(0.5, g(0.0, 1.0)), (0.5, g(2.0, 1.0))]).unwrap();
        let mixture = Mixture::new(vec![
            (0.5, Distribution::MixtureOfGaussians(inner)),
            (0.5, Distribution::Gaussian(g(5.0, 1.0))),
        ])
        .unwrap();
        assert_eq!(mixture.len(), 3);
        assert_eq!(mixture.weights(), &[0.25, 0.25, 0.5]);
        assert!(matches!(
            mixture.into_distribution(),
            Distribution::MixtureOfGaussians(_)
        ));
    }
}
