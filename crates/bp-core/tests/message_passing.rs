//! End-to-end message passing over small networks.
//!
//! The networks here are polytrees wired through a test-local
//! [`MessageSource`] that asks neighbouring nodes for their outgoing
//! messages on demand.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use bp_config::ApproxConfig;
use bp_core::conditional::{
    ConditionalDiscrete, ConditionalGaussian, RegressionDensity, RegressionModel,
};
use bp_core::{
    BeliefNode, ConditionalModel, Discrete, Distribution, Error, MessageEngine, MessageSource,
    Notification, Result,
};

struct Network {
    engine: MessageEngine,
    nodes: Vec<RefCell<BeliefNode>>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
}

impl Network {
    fn new(engine: MessageEngine) -> Self {
        Network {
            engine,
            nodes: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a node; `children` is how many children it will get.
    fn add(&mut self, name: &str, model: ConditionalModel, parents: &[usize], children: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(RefCell::new(BeliefNode::new(name, model, children)));
        self.parents.push(parents.to_vec());
        self.children.push(Vec::new());
        for &p in parents {
            self.children[p].push(id);
        }
        id
    }

    fn view(&self, node: usize) -> View<'_> {
        View { net: self, node }
    }

    fn posterior(&self, node: usize) -> Result<Distribution> {
        self.nodes[node]
            .borrow_mut()
            .posterior(&self.engine, &self.view(node))
    }

    fn position(list: &[usize], node: usize) -> usize {
        list.iter().position(|&n| n == node).unwrap()
    }

    /// Delivers notifications hop by hop; returns how many were delivered.
    fn deliver(&self, from: usize, notes: Vec<Notification>) -> usize {
        let mut queue: VecDeque<(usize, Notification)> =
            notes.into_iter().map(|n| (from, n)).collect();
        let mut delivered = 0;
        while let Some((sender, note)) = queue.pop_front() {
            delivered += 1;
            let (target, next) = match note {
                Notification::InvalidatePiMessage { child } => {
                    let target = self.children[sender][child];
                    let slot = Self::position(&self.parents[target], sender);
                    (target, self.nodes[target].borrow_mut().invalidate_pi_message(slot))
                }
                Notification::InvalidateLambdaMessage { parent } => {
                    let target = self.parents[sender][parent];
                    let slot = Self::position(&self.children[target], sender);
                    (target, self.nodes[target].borrow_mut().invalidate_lambda_message(slot))
                }
            };
            queue.extend(next.unwrap().into_iter().map(|n| (target, n)));
        }
        delivered
    }
}

struct View<'a> {
    net: &'a Network,
    node: usize,
}

impl MessageSource for View<'_> {
    fn pi_message(&self, parent: usize) -> Result<Distribution> {
        let p = *self.net.parents[self.node]
            .get(parent)
            .ok_or_else(|| Error::StaleReference(format!("parent {parent}")))?;
        let slot = Network::position(&self.net.children[p], self.node);
        self.net.nodes[p]
            .borrow_mut()
            .pi_message_to_child(&self.net.engine, &self.net.view(p), slot)
    }

    fn lambda_message(&self, child: usize) -> Result<Distribution> {
        let c = *self.net.children[self.node]
            .get(child)
            .ok_or_else(|| Error::StaleReference(format!("child {child}")))?;
        let slot = Network::position(&self.net.parents[c], self.node);
        self.net.nodes[c]
            .borrow_mut()
            .lambda_message_to_parent(&self.net.engine, &self.net.view(c), slot)
    }
}

fn normal(mu: f64, sigma: f64) -> Distribution {
    Distribution::gaussian(mu, sigma).unwrap()
}

fn linear(weights: Vec<f64>, noise: f64) -> ConditionalModel {
    ConditionalModel::ConditionalGaussian(ConditionalGaussian::new(weights, 0.0, noise).unwrap())
}

#[test]
fn observed_sum_splits_between_parents() {
    let mut net = Network::new(MessageEngine::default());
    let a = net.add("a", ConditionalModel::Marginal(normal(0.0, 1.0)), &[], 1);
    let b = net.add("b", ConditionalModel::Marginal(normal(0.0, 1.0)), &[], 1);
    let c = net.add("c", ConditionalModel::Sum { parents: 2 }, &[a, b], 0);

    let prior = net.posterior(c).unwrap();
    assert!((prior.variance().unwrap() - 2.0).abs() < 1e-12);

    net.nodes[c].borrow_mut().set_evidence(2.0).unwrap();
    for node in [a, b] {
        let post = net.posterior(node).unwrap();
        let (mu, sigma) = post.gaussian_params().unwrap();
        assert!((mu - 1.0).abs() < 1e-12);
        assert!((sigma * sigma - 0.5).abs() < 1e-12);
    }
}

#[test]
fn evidence_travels_up_a_chain_and_clears_hop_by_hop() {
    let mut net = Network::new(MessageEngine::default());
    let x = net.add("x", ConditionalModel::Marginal(normal(0.0, 1.0)), &[], 1);
    let y = net.add("y", linear(vec![1.0], 1.0), &[x], 1);
    let z = net.add("z", linear(vec![1.0], 1.0), &[y], 0);

    let notes = net.nodes[z].borrow_mut().set_evidence(3.0).unwrap();
    net.deliver(z, notes);

    // z | x ~ N(x, 2)
    let post = net.posterior(x).unwrap();
    let (mu, sigma) = post.gaussian_params().unwrap();
    assert!((mu - 1.0).abs() < 1e-12);
    assert!((sigma * sigma - 2.0 / 3.0).abs() < 1e-12);

    let notes = net.nodes[z].borrow_mut().clear_evidence();
    assert_eq!(notes, vec![Notification::InvalidateLambdaMessage { parent: 0 }]);
    // z -> y, then y -> x; x has nobody left to tell.
    assert_eq!(net.deliver(z, notes), 2);
    assert_eq!(
        net.nodes[x].borrow().messages().lambda(0).unwrap().state().name(),
        "invalidated"
    );

    assert_eq!(net.posterior(x).unwrap(), normal(0.0, 1.0));
    assert!((net.posterior(z).unwrap().variance().unwrap() - 3.0).abs() < 1e-12);
}

#[test]
fn discrete_diagnosis() {
    let mut net = Network::new(MessageEngine::default());
    let rain = net.add(
        "rain",
        ConditionalModel::Marginal(Distribution::Discrete(
            Discrete::from_probabilities(vec![0.2, 0.8]).unwrap(),
        )),
        &[],
        1,
    );
    let wet = net.add(
        "wet",
        ConditionalModel::ConditionalDiscrete(
            ConditionalDiscrete::new(vec![2], 2, vec![0.9, 0.1, 0.2, 0.8]).unwrap(),
        ),
        &[rain],
        0,
    );

    let prior = net.posterior(wet).unwrap();
    assert!((prior.density(0.0) - (0.2 * 0.9 + 0.8 * 0.2)).abs() < 1e-12);

    let notes = net.nodes[wet].borrow_mut().set_evidence(0.0).unwrap();
    net.deliver(wet, notes);
    let post = net.posterior(rain).unwrap();
    assert!((post.density(0.0) - 0.18 / 0.34).abs() < 1e-12);
}

#[test]
fn sibling_evidence_reaches_the_other_child() {
    let mut net = Network::new(MessageEngine::default());
    let x = net.add("x", ConditionalModel::Marginal(normal(0.0, 1.0)), &[], 2);
    let seen = net.add("seen", linear(vec![1.0], 1.0), &[x], 0);
    let unseen = net.add("unseen", linear(vec![1.0], 1.0), &[x], 0);

    let before = net.posterior(unseen).unwrap();
    assert!((before.variance().unwrap() - 2.0).abs() < 1e-12);

    let notes = net.nodes[seen].borrow_mut().set_evidence(2.0).unwrap();
    net.deliver(seen, notes);

    // x | seen ~ N(1, 0.5), so unseen ~ N(1, 1.5).
    let after = net.posterior(unseen).unwrap();
    let (mu, sigma) = after.gaussian_params().unwrap();
    assert!((mu - 1.0).abs() < 1e-12);
    assert!((sigma * sigma - 1.5).abs() < 1e-12);
}

#[test]
fn unsupported_combination_names_the_signature() {
    let engine = MessageEngine::default();
    let cpt = ConditionalDiscrete::new(vec![2, 2], 2, vec![0.9, 0.1, 0.5, 0.5, 0.5, 0.5, 0.1, 0.9])
        .unwrap();
    let lambda = Distribution::Discrete(Discrete::from_probabilities(vec![0.3, 0.7]).unwrap());
    // A table over a continuous parent has no helper, numerical or closed.
    let err = engine
        .compute_lambda_message(
            &ConditionalModel::ConditionalDiscrete(cpt),
            &lambda,
            &[None, Some(normal(0.0, 1.0))],
        )
        .unwrap_err();
    match err {
        Error::UnsupportedCombination { kind, signature } => {
            assert_eq!(kind, "lambda-message");
            assert!(signature.contains("ConditionalDiscrete"), "{signature}");
            assert!(signature.contains("Gaussian"), "{signature}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

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

#[test]
fn evidence_on_a_regression_child_reaches_its_parent() {
    let mut net = Network::new(MessageEngine::default());
    let x = net.add("x", ConditionalModel::Marginal(normal(0.0, 1.0)), &[], 1);
    let y = net.add(
        "y",
        ConditionalModel::RegressionDensity(RegressionDensity::new(Arc::new(Affine), 0.25).unwrap()),
        &[x],
        0,
    );

    let notes = net.nodes[y].borrow_mut().set_evidence(3.0).unwrap();
    net.deliver(y, notes);

    // 3 = 2x + 1 + e gives a likelihood N(1, 1/16) on x; against N(0, 1)
    // the posterior is N(16/17, 1/17).
    let post = net.posterior(x).unwrap();
    assert!((post.mean().unwrap() - 16.0 / 17.0).abs() < 2e-2);
    assert!((post.variance().unwrap() - 1.0 / 17.0).abs() < 5e-3);
}

#[test]
fn engine_honours_a_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[fit]\nmax_iterations = 4\n\n[messages]\ntabulation_points = 65").unwrap();
    let config = ApproxConfig::from_file(file.path()).unwrap();
    let engine = MessageEngine::new(config);
    assert_eq!(engine.config().fit.max_iterations, 4);
    assert_eq!(engine.config().messages.tabulation_points, 65);
    assert_eq!(engine.fit_options().max_iterations, 4);
}
