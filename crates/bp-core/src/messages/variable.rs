//! One variable of a belief network and the messages it caches.
//!
//! A [`BeliefNode`] does not know its neighbours. Incoming messages are
//! pulled on demand through a [`MessageSource`], and every change that
//! affects outgoing messages is returned as a list of [`Notification`]s
//! for the network layer to deliver. Delivery is one hop: a node that
//! receives a notification invalidates its own slot and returns the next
//! round, it never calls its neighbours directly.

use bp_common::{Error, Result};
use tracing::{debug, warn};

use super::slots::{MessageSet, MessageSlot, SlotState};
use super::MessageEngine;
use crate::conditional::ConditionalModel;
use crate::distribution::{Discrete, Distribution};
use crate::logging::event_names;

/// Access to the messages a node's neighbours currently send it.
pub trait MessageSource {
    /// Pi message from parent `parent` to this node.
    fn pi_message(&self, parent: usize) -> Result<Distribution>;

    /// Lambda message from child `child` to this node.
    fn lambda_message(&self, child: usize) -> Result<Distribution>;
}

/// An outgoing message that is no longer valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The pi message this node sends to `child` changed.
    InvalidatePiMessage { child: usize },
    /// The lambda message this node sends to `parent` changed.
    InvalidateLambdaMessage { parent: usize },
}

#[derive(Debug)]
pub struct BeliefNode {
    name: String,
    model: ConditionalModel,
    messages: MessageSet,
    evidence: Option<Distribution>,
    pi: Option<Distribution>,
    lambda: Option<Distribution>,
    posterior: Option<Distribution>,
}

impl BeliefNode {
    pub fn new(name: impl Into<String>, model: ConditionalModel, children: usize) -> Self {
        let parents = model.parent_count();
        BeliefNode {
            name: name.into(),
            model,
            messages: MessageSet::new(parents, children),
            evidence: None,
            pi: None,
            lambda: None,
            posterior: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &ConditionalModel {
        &self.model
    }

    pub fn messages(&self) -> &MessageSet {
        &self.messages
    }

    pub fn evidence(&self) -> Option<&Distribution> {
        self.evidence.as_ref()
    }

    /// Observes the variable at `value`. Discrete variables take a state
    /// index.
    pub fn set_evidence(&mut self, value: f64) -> Result<Vec<Notification>> {
        let evidence = match self.model.child_states() {
            Some(states) => {
                if value.fract() != 0.0 || value < 0.0 {
                    return Err(Error::invalid(format!(
                        "discrete evidence must be a state index, got {value}"
                    )));
                }
                Distribution::Discrete(Discrete::point_mass(states, value as usize)?)
            }
            None => Distribution::delta(value)?,
        };
        debug!(
            event = event_names::EVIDENCE_SET,
            node = %self.name,
            value,
            "evidence set"
        );
        self.evidence = Some(evidence);
        Ok(self.evidence_changed())
    }

    pub fn clear_evidence(&mut self) -> Vec<Notification> {
        if self.evidence.take().is_none() {
            return Vec::new();
        }
        self.evidence_changed()
    }

    fn evidence_changed(&mut self) -> Vec<Notification> {
        self.lambda = None;
        self.posterior = None;
        self.parent_notifications(None)
            .chain(self.child_notifications(None))
            .collect()
    }

    /// Parent `parent` announced a new pi message. The node's own pi is
    /// dropped; children and the other parents are told.
    pub fn invalidate_pi_message(&mut self, parent: usize) -> Result<Vec<Notification>> {
        if !self.messages.pi_mut(parent)?.invalidate() {
            return Ok(Vec::new());
        }
        debug!(
            event = event_names::SLOT_INVALIDATED,
            node = %self.name,
            slot = %format!("pi[{parent}]"),
            "incoming message invalidated"
        );
        self.pi = None;
        self.posterior = None;
        Ok(self
            .child_notifications(None)
            .chain(self.parent_notifications(Some(parent)))
            .collect())
    }

    /// Child `child` announced a new lambda message. The node's own lambda
    /// is dropped; parents and the other children are told.
    pub fn invalidate_lambda_message(&mut self, child: usize) -> Result<Vec<Notification>> {
        if !self.messages.lambda_mut(child)?.invalidate() {
            return Ok(Vec::new());
        }
        debug!(
            event = event_names::SLOT_INVALIDATED,
            node = %self.name,
            slot = %format!("lambda[{child}]"),
            "incoming message invalidated"
        );
        self.lambda = None;
        self.posterior = None;
        Ok(self
            .parent_notifications(None)
            .chain(self.child_notifications(Some(child)))
            .collect())
    }

    fn parent_notifications(&self, except: Option<usize>) -> impl Iterator<Item = Notification> {
        (0..self.messages.parents())
            .filter(move |p| Some(*p) != except)
            .map(|parent| Notification::InvalidateLambdaMessage { parent })
    }

    fn child_notifications(&self, except: Option<usize>) -> impl Iterator<Item = Notification> {
        (0..self.messages.children())
            .filter(move |c| Some(*c) != except)
            .map(|child| Notification::InvalidatePiMessage { child })
    }

    /// Prior of the variable given its parents.
    pub fn pi<S: MessageSource + ?Sized>(
        &mut self,
        engine: &MessageEngine,
        source: &S,
    ) -> Result<Distribution> {
        if let Some(pi) = &self.pi {
            return Ok(pi.clone());
        }
        let parent_pis = (0..self.messages.parents())
            .map(|p| self.fetch_pi(p, source))
            .collect::<Result<Vec<_>>>()?;
        let pi = engine.compute_pi_message(&self.model, &parent_pis)?;
        self.pi = Some(pi.clone());
        Ok(pi)
    }

    /// Combined likelihood; evidence overrides the children.
    pub fn lambda<S: MessageSource + ?Sized>(
        &mut self,
        engine: &MessageEngine,
        source: &S,
    ) -> Result<Distribution> {
        if let Some(lambda) = &self.lambda {
            return Ok(lambda.clone());
        }
        let lambda = match self.evidence.clone() {
            Some(evidence) => evidence,
            None => {
                let child_lambdas = (0..self.messages.children())
                    .map(|c| self.fetch_lambda(c, source))
                    .collect::<Result<Vec<_>>>()?;
                engine.compute_lambda(&child_lambdas)?
            }
        };
        self.lambda = Some(lambda.clone());
        Ok(lambda)
    }

    pub fn posterior<S: MessageSource + ?Sized>(
        &mut self,
        engine: &MessageEngine,
        source: &S,
    ) -> Result<Distribution> {
        if let Some(posterior) = &self.posterior {
            return Ok(posterior.clone());
        }
        let pi = self.pi(engine, source)?;
        let lambda = self.lambda(engine, source)?;
        let posterior = engine.compute_posterior(&pi, &lambda)?;
        self.posterior = Some(posterior.clone());
        Ok(posterior)
    }

    /// Pi message this node sends to `child`.
    pub fn pi_message_to_child<S: MessageSource + ?Sized>(
        &mut self,
        engine: &MessageEngine,
        source: &S,
        child: usize,
    ) -> Result<Distribution> {
        self.messages.lambda(child)?;
        if let Some(evidence) = &self.evidence {
            return Ok(evidence.clone());
        }
        let pi = self.pi(engine, source)?;
        // The recipient's own lambda is never read, so it is not fetched.
        let child_lambdas = (0..self.messages.children())
            .map(|c| {
                if c == child {
                    Ok(Distribution::Noninformative)
                } else {
                    self.fetch_lambda(c, source)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        engine.compute_pi_message_to_child(&pi, &child_lambdas, child)
    }

    /// Lambda message this node sends to `parent`.
    pub fn lambda_message_to_parent<S: MessageSource + ?Sized>(
        &mut self,
        engine: &MessageEngine,
        source: &S,
        parent: usize,
    ) -> Result<Distribution> {
        self.messages.pi(parent)?;
        let lambda = self.lambda(engine, source)?;
        let parent_pis = (0..self.messages.parents())
            .map(|p| {
                if p == parent {
                    Ok(None)
                } else {
                    self.fetch_pi(p, source).map(Some)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        engine.compute_lambda_message(&self.model, &lambda, &parent_pis)
    }

    fn fetch_pi<S: MessageSource + ?Sized>(&mut self, parent: usize, source: &S) -> Result<Distribution> {
        let name = &self.name;
        let slot = self.messages.pi_mut(parent)?;
        fetch(name, slot, || source.pi_message(parent))
    }

    fn fetch_lambda<S: MessageSource + ?Sized>(
        &mut self,
        child: usize,
        source: &S,
    ) -> Result<Distribution> {
        let name = &self.name;
        let slot = self.messages.lambda_mut(child)?;
        fetch(name, slot, || source.lambda_message(child))
    }
}

/// Returns the cached message or pulls a fresh one into the slot.
fn fetch(
    node: &str,
    slot: &mut MessageSlot,
    pull: impl FnOnce() -> Result<Distribution>,
) -> Result<Distribution> {
    match slot.state() {
        SlotState::Ready(message) => return Ok(message.clone()),
        SlotState::Invalidated => slot.reset(),
        SlotState::Unset | SlotState::Computing => {}
    }
    slot.begin()?;
    match pull() {
        Ok(message) => {
            slot.complete(message.clone())?;
            Ok(message)
        }
        Err(err) => {
            if matches!(err, Error::StaleReference(_)) {
                warn!(
                    event = event_names::SLOT_STALE,
                    node,
                    slot = slot.label(),
                    error = %err,
                    "neighbour reference went stale"
                );
            }
            slot.abandon();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditional::ConditionalGaussian;
    use std::cell::Cell;

    /// Serves fixed messages and counts how often it was asked.
    struct Fixed {
        pis: Vec<Distribution>,
        lambdas: Vec<Distribution>,
        calls: Cell<usize>,
    }

    impl Fixed {
        fn new(pis: Vec<Distribution>, lambdas: Vec<Distribution>) -> Self {
            Fixed {
                pis,
                lambdas,
                calls: Cell::new(0),
            }
        }
    }

    impl MessageSource for Fixed {
        fn pi_message(&self, parent: usize) -> Result<Distribution> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.pis[parent].clone())
        }

        fn lambda_message(&self, child: usize) -> Result<Distribution> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.lambdas[child].clone())
        }
    }

    struct Gone;

    impl MessageSource for Gone {
        fn pi_message(&self, parent: usize) -> Result<Distribution> {
            Err(Error::StaleReference(format!("parent {parent}")))
        }

        fn lambda_message(&self, child: usize) -> Result<Distribution> {
            Err(Error::StaleReference(format!("child {child}")))
        }
    }

    fn normal(mu: f64, sigma: f64) -> Distribution {
        Distribution::gaussian(mu, sigma).unwrap()
    }

    fn linear_child(children: usize) -> BeliefNode {
        BeliefNode::new(
            "y",
            ConditionalModel::ConditionalGaussian(
                ConditionalGaussian::new(vec![1.0], 0.0, 1.0).unwrap(),
            ),
            children,
        )
    }

    #[test]
    fn evidence_flows_back_to_the_parent() {
        let engine = MessageEngine::default();
        let mut y = linear_child(0);
        let source = Fixed::new(vec![normal(0.0, 1.0)], vec![]);

        let pi = y.pi(&engine, &source).unwrap();
        let (_, sigma) = pi.gaussian_params().unwrap();
        assert!((sigma * sigma - 2.0).abs() < 1e-12);

        let notes = y.set_evidence(2.0).unwrap();
        assert_eq!(notes, vec![Notification::InvalidateLambdaMessage { parent: 0 }]);
        let msg = y.lambda_message_to_parent(&engine, &source, 0).unwrap();
        let (mu, sigma) = msg.gaussian_params().unwrap();
        assert!((mu - 2.0).abs() < 1e-12);
        assert!((sigma - 1.0).abs() < 1e-12);

        let mut x = BeliefNode::new(
            "x",
            ConditionalModel::Marginal(normal(0.0, 1.0)),
            1,
        );
        let posterior = x
            .posterior(&engine, &Fixed::new(vec![], vec![msg]))
            .unwrap();
        let (mu, sigma) = posterior.gaussian_params().unwrap();
        assert!((mu - 1.0).abs() < 1e-12);
        assert!((sigma * sigma - 0.5).abs() < 1e-12);
        assert_eq!(y.posterior(&engine, &source).unwrap(), Distribution::delta(2.0).unwrap());
    }

    #[test]
    fn messages_are_cached_until_invalidated() {
        let engine = MessageEngine::default();
        let mut y = linear_child(2);
        let source = Fixed::new(vec![normal(0.0, 1.0)], vec![normal(1.0, 1.0), normal(1.0, 1.0)]);

        y.posterior(&engine, &source).unwrap();
        let first = source.calls.get();
        assert_eq!(first, 3);
        y.posterior(&engine, &source).unwrap();
        y.pi_message_to_child(&engine, &source, 0).unwrap();
        assert_eq!(source.calls.get(), first);

        let notes = y.invalidate_pi_message(0).unwrap();
        assert_eq!(
            notes,
            vec![
                Notification::InvalidatePiMessage { child: 0 },
                Notification::InvalidatePiMessage { child: 1 },
            ]
        );
        assert_eq!(y.messages().pi(0).unwrap().state().name(), "invalidated");
        // A second notice for the same slot goes no further.
        assert!(y.invalidate_pi_message(0).unwrap().is_empty());

        y.pi(&engine, &source).unwrap();
        assert_eq!(source.calls.get(), first + 1);
        assert!(y.messages().pi(0).unwrap().is_ready());
    }

    #[test]
    fn lambda_invalidation_skips_the_sender() {
        let engine = MessageEngine::default();
        let mut y = linear_child(2);
        let source = Fixed::new(vec![normal(0.0, 1.0)], vec![normal(1.0, 1.0), normal(1.0, 1.0)]);
        y.lambda(&engine, &source).unwrap();

        let notes = y.invalidate_lambda_message(1).unwrap();
        assert_eq!(
            notes,
            vec![
                Notification::InvalidateLambdaMessage { parent: 0 },
                Notification::InvalidatePiMessage { child: 0 },
            ]
        );
    }

    #[test]
    fn stale_neighbour_leaves_the_slot_unset() {
        let engine = MessageEngine::default();
        let mut y = linear_child(0);
        let err = y.pi(&engine, &Gone).unwrap_err();
        assert!(matches!(err, Error::StaleReference(_)));
        assert_eq!(y.messages().pi(0).unwrap().state(), &SlotState::Unset);

        let source = Fixed::new(vec![normal(0.0, 1.0)], vec![]);
        assert!(y.pi(&engine, &source).is_ok());
    }

    #[test]
    fn discrete_evidence_is_a_state_index() {
        let table = Discrete::from_probabilities(vec![0.2, 0.3, 0.5]).unwrap();
        let mut node = BeliefNode::new(
            "d",
            ConditionalModel::Marginal(Distribution::Discrete(table)),
            0,
        );
        assert!(node.set_evidence(1.5).is_err());
        assert!(node.set_evidence(3.0).is_err());
        node.set_evidence(2.0).unwrap();
        assert_eq!(
            node.evidence(),
            Some(&Distribution::Discrete(Discrete::point_mass(3, 2).unwrap()))
        );
        assert!(node.clear_evidence().is_empty());
        assert!(node.evidence().is_none());
    }
}
