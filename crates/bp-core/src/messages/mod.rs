//! Pi/lambda message computation.
//!
//! [`MessageEngine`] owns one [`HelperTable`] per message kind and routes
//! each request to the most specific registered helper for the runtime
//! tags of its arguments:
//!
//! | kind            | signature                                   |
//! |-----------------|---------------------------------------------|
//! | lambda          | the informative lambda messages             |
//! | pi              | model, then every parent's pi message        |
//! | posterior       | pi, lambda                                  |
//! | pi message      | pi, then the other children's lambdas       |
//! | lambda message  | model, child lambda, then the other parents |
//!
//! When no closed form is registered for a combination, generic helpers
//! fall back to numerical products and mixture fitting.

pub mod dispatch;
mod lambda;
mod lambda_message;
mod pi;
mod pi_message;
mod posterior;
pub mod slots;
pub mod variable;

pub use dispatch::{
    match_pattern, HelperEntry, HelperKind, HelperTable, PatternElement, Repeat, Specificity,
};
pub use slots::{MessageSet, MessageSlot, SlotState};
pub use variable::{BeliefNode, MessageSource, Notification};

use bp_common::{Error, Result};
use bp_config::{ApproxConfig, SimilarityThresholds};
use bp_math::IntervalSet;

use crate::approximation::{fit_mixture, FitOptions, Integrator};
use crate::conditional::ConditionalModel;
use crate::distribution::{Distribution, Gaussian, MixGaussians};
use crate::tags::TypeTag;

pub type LambdaHelper = fn(&MessageEngine, &[Distribution]) -> Result<Option<Distribution>>;
pub type PiHelper =
    fn(&MessageEngine, &ConditionalModel, &[Distribution]) -> Result<Option<Distribution>>;
pub type PosteriorHelper =
    fn(&MessageEngine, &Distribution, &Distribution) -> Result<Option<Distribution>>;
pub type PiMessageHelper =
    fn(&MessageEngine, &Distribution, &[Distribution]) -> Result<Option<Distribution>>;
pub type LambdaMessageHelper =
    fn(&MessageEngine, &LambdaMessageRequest<'_>) -> Result<Option<Distribution>>;

/// Arguments of a lambda message from a variable to one of its parents.
#[derive(Debug, Clone, Copy)]
pub struct LambdaMessageRequest<'a> {
    pub model: &'a ConditionalModel,
    pub lambda: &'a Distribution,
    /// Pi messages from every parent; `None` at the recipient's position.
    pub parents: &'a [Option<Distribution>],
    pub target: usize,
}

impl<'a> LambdaMessageRequest<'a> {
    /// Pi messages of the parents other than the recipient, in order.
    pub fn others(&self) -> impl Iterator<Item = &'a Distribution> + 'a {
        let target = self.target;
        self.parents
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != target)
            .filter_map(|(_, p)| p.as_ref())
    }

    fn signature(&self) -> Vec<TypeTag> {
        let mut signature = vec![self.model.type_tag(), self.lambda.type_tag()];
        signature.extend(self.others().map(Distribution::type_tag));
        signature
    }
}

pub struct MessageEngine {
    config: ApproxConfig,
    integrator: Integrator,
    lambda: HelperTable<LambdaHelper>,
    pi: HelperTable<PiHelper>,
    posterior: HelperTable<PosteriorHelper>,
    pi_message: HelperTable<PiMessageHelper>,
    lambda_message: HelperTable<LambdaMessageHelper>,
}

impl std::fmt::Debug for MessageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEngine")
            .field("config", &self.config)
            .field("lambda_helpers", &self.lambda.len())
            .field("pi_helpers", &self.pi.len())
            .field("posterior_helpers", &self.posterior.len())
            .field("pi_message_helpers", &self.pi_message.len())
            .field("lambda_message_helpers", &self.lambda_message.len())
            .finish()
    }
}

impl Default for MessageEngine {
    fn default() -> Self {
        MessageEngine::new(ApproxConfig::default())
    }
}

impl MessageEngine {
    /// Engine with the built-in helpers registered.
    pub fn new(config: ApproxConfig) -> Self {
        let mut engine = MessageEngine {
            integrator: Integrator::from_config(&config.integration),
            config,
            lambda: HelperTable::new(HelperKind::Lambda),
            pi: HelperTable::new(HelperKind::Pi),
            posterior: HelperTable::new(HelperKind::Posterior),
            pi_message: HelperTable::new(HelperKind::PiMessage),
            lambda_message: HelperTable::new(HelperKind::LambdaMessage),
        };
        lambda::register(&mut engine.lambda);
        pi::register(&mut engine.pi);
        posterior::register(&mut engine.posterior);
        pi_message::register(&mut engine.pi_message);
        lambda_message::register(&mut engine.lambda_message);
        engine
    }

    pub fn config(&self) -> &ApproxConfig {
        &self.config
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    pub fn fit_options(&self) -> FitOptions {
        FitOptions::from_config(&self.config)
    }

    pub fn lambda_helpers_mut(&mut self) -> &mut HelperTable<LambdaHelper> {
        &mut self.lambda
    }

    pub fn pi_helpers_mut(&mut self) -> &mut HelperTable<PiHelper> {
        &mut self.pi
    }

    pub fn posterior_helpers_mut(&mut self) -> &mut HelperTable<PosteriorHelper> {
        &mut self.posterior
    }

    pub fn pi_message_helpers_mut(&mut self) -> &mut HelperTable<PiMessageHelper> {
        &mut self.pi_message
    }

    pub fn lambda_message_helpers_mut(&mut self) -> &mut HelperTable<LambdaMessageHelper> {
        &mut self.lambda_message
    }

    /// Combined likelihood from the children's lambda messages.
    ///
    /// Noninformative messages are skipped; with nothing left the result
    /// is noninformative.
    pub fn compute_lambda(&self, lambda_messages: &[Distribution]) -> Result<Distribution> {
        let informative: Vec<Distribution> = lambda_messages
            .iter()
            .filter(|d| !d.is_noninformative())
            .cloned()
            .collect();
        if informative.is_empty() {
            return Ok(Distribution::Noninformative);
        }
        let signature: Vec<TypeTag> = informative.iter().map(Distribution::type_tag).collect();
        self.lambda
            .dispatch(&signature, |helper| helper(self, &informative))
    }

    /// Prior of a variable given its model and the parents' pi messages.
    pub fn compute_pi_message(
        &self,
        model: &ConditionalModel,
        parent_pis: &[Distribution],
    ) -> Result<Distribution> {
        check_parent_count(model, parent_pis.len())?;
        let mut signature = vec![model.type_tag()];
        signature.extend(parent_pis.iter().map(Distribution::type_tag));
        self.pi
            .dispatch(&signature, |helper| helper(self, model, parent_pis))
    }

    /// Posterior `∝ pi · lambda`.
    pub fn compute_posterior(&self, pi: &Distribution, lambda: &Distribution) -> Result<Distribution> {
        let signature = [pi.type_tag(), lambda.type_tag()];
        self.posterior
            .dispatch(&signature, |helper| helper(self, pi, lambda))
    }

    /// Pi message to child `child`: the variable's pi combined with the
    /// lambda messages of every other child.
    pub fn compute_pi_message_to_child(
        &self,
        pi: &Distribution,
        lambda_messages: &[Distribution],
        child: usize,
    ) -> Result<Distribution> {
        if child >= lambda_messages.len() {
            return Err(Error::invalid(format!(
                "child {child} out of range for {} lambda messages",
                lambda_messages.len()
            )));
        }
        let others: Vec<Distribution> = lambda_messages
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != child)
            .map(|(_, d)| d.clone())
            .collect();
        let mut signature = vec![pi.type_tag()];
        signature.extend(others.iter().map(Distribution::type_tag));
        self.pi_message
            .dispatch(&signature, |helper| helper(self, pi, &others))
    }

    /// Lambda message to the parent whose entry in `parent_pis` is `None`.
    ///
    /// A child that has heard nothing sends nothing.
    pub fn compute_lambda_message(
        &self,
        model: &ConditionalModel,
        child_lambda: &Distribution,
        parent_pis: &[Option<Distribution>],
    ) -> Result<Distribution> {
        check_parent_count(model, parent_pis.len())?;
        let mut missing = parent_pis
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_none())
            .map(|(i, _)| i);
        let target = match (missing.next(), missing.next()) {
            (Some(i), None) => i,
            _ => {
                return Err(Error::invalid(
                    "exactly one parent must be left open as the recipient",
                ))
            }
        };
        if child_lambda.is_noninformative() {
            return Ok(Distribution::Noninformative);
        }
        let request = LambdaMessageRequest {
            model,
            lambda: child_lambda,
            parents: parent_pis,
            target,
        };
        let signature = request.signature();
        self.lambda_message
            .dispatch(&signature, |helper| helper(self, &request))
    }

    /// Fits `initial` to `target` over `supports` at `tolerance`, with an
    /// optional equivalent sample size for regularization.
    pub fn fit_mixture(
        &self,
        target: &Distribution,
        initial: &MixGaussians,
        supports: &IntervalSet,
        tolerance: f64,
        equivalent_sample_size: Option<f64>,
    ) -> Result<MixGaussians> {
        let options = self
            .fit_options()
            .with_tolerance(tolerance)
            .with_equivalent_sample_size(equivalent_sample_size);
        fit_mixture(target, initial, supports, &options)
    }

    /// Drops light and duplicate components; one survivor is returned as a
    /// plain Gaussian.
    pub(crate) fn prune(
        &self,
        mixture: MixGaussians,
        thresholds: &SimilarityThresholds,
    ) -> Result<Distribution> {
        Ok(mixture
            .simplify(self.config.fit.min_mix_proportion, thresholds)?
            .into_distribution())
    }

    /// Fits a numerically represented density with its own initial guess,
    /// returning the mixture collapsed to a Gaussian when it has one
    /// component.
    pub(crate) fn approximate(&self, target: &Distribution, tolerance: f64) -> Result<Distribution> {
        let (initial, supports) = match target {
            Distribution::Product(p) if !p.support().is_empty() => {
                (p.initial_mix()?, p.support().clone())
            }
            other => (
                seed_mixture(other.mean()?, other.stddev()?)?,
                other.effective_support(self.config.messages.child_support_epsilon)?,
            ),
        };
        let fitted = self.fit_mixture(target, &initial, &supports, tolerance, None)?;
        Ok(fitted.into_distribution())
    }
}

fn check_parent_count(model: &ConditionalModel, supplied: usize) -> Result<()> {
    let expected = model.parent_count();
    if expected != supplied {
        return Err(Error::DomainError {
            expected,
            actual: supplied,
        });
    }
    Ok(())
}

/// Three equal components at the mean and one deviation either side.
pub(crate) fn seed_mixture(mean: f64, sd: f64) -> Result<MixGaussians> {
    if !(sd > 0.0) || !sd.is_finite() {
        return Err(Error::degenerate(format!(
            "cannot seed a mixture with standard deviation {sd}"
        )));
    }
    MixGaussians::new(
        [0.0, -sd, sd]
            .into_iter()
            .map(|offset| Gaussian::new(mean + offset, sd).map(|g| (1.0 / 3.0, g)))
            .collect::<Result<Vec<_>>>()?,
    )
}

/// A proper Gaussian; point masses are left to other helpers.
pub(crate) fn as_gaussian(d: &Distribution) -> Option<Gaussian> {
    match d {
        Distribution::Gaussian(g) => Some(*g),
        _ => None,
    }
}

/// Discrete table, refusing multidimensional ones.
pub(crate) fn as_vector(d: &Distribution) -> Option<&[f64]> {
    match d {
        Distribution::Discrete(t) if t.dimensions().len() == 1 => Some(t.probabilities()),
        _ => None,
    }
}
