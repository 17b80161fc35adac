//! Conditional models `p(x | parents)` attached to belief-network nodes.

use std::fmt;
use std::sync::Arc;

use bp_common::{Error, Result};
use bp_math::{normal_pdf, two_sided_z, Interval};

use crate::distribution::Distribution;
use crate::tags::TypeTag;

/// Nonlinear mean function for [`RegressionDensity`].
pub trait RegressionModel: fmt::Debug + Send + Sync {
    fn input_dimension(&self) -> usize;

    fn evaluate(&self, inputs: &[f64]) -> f64;

    /// Partial derivatives of [`Self::evaluate`] at `inputs`.
    fn gradient(&self, inputs: &[f64]) -> Vec<f64>;
}

/// `x | u ~ N(offset + weights·u, noise_variance)`.
///
/// A zero noise variance makes the child a deterministic linear function.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalGaussian {
    weights: Vec<f64>,
    offset: f64,
    noise_variance: f64,
}

impl ConditionalGaussian {
    pub fn new(weights: Vec<f64>, offset: f64, noise_variance: f64) -> Result<Self> {
        if !(noise_variance >= 0.0) || !noise_variance.is_finite() {
            return Err(Error::invalid(format!(
                "noise variance must be finite and nonnegative, got {noise_variance}"
            )));
        }
        if weights.iter().chain(std::iter::once(&offset)).any(|v| !v.is_finite()) {
            return Err(Error::invalid("regression coefficients must be finite"));
        }
        Ok(ConditionalGaussian {
            weights,
            offset,
            noise_variance,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    pub fn mean_given(&self, parents: &[f64]) -> f64 {
        self.offset
            + self
                .weights
                .iter()
                .zip(parents)
                .map(|(a, u)| a * u)
                .sum::<f64>()
    }
}

/// Conditional probability table. Rows are parent configurations in
/// row-major order (last parent fastest); each row is a distribution over
/// the child's states.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalDiscrete {
    parent_dims: Vec<usize>,
    child_states: usize,
    table: Vec<f64>,
}

impl ConditionalDiscrete {
    /// Rows are normalized; a row with no mass is rejected.
    pub fn new(parent_dims: Vec<usize>, child_states: usize, table: Vec<f64>) -> Result<Self> {
        if child_states == 0 || parent_dims.contains(&0) {
            return Err(Error::invalid("state counts must be positive"));
        }
        let rows: usize = parent_dims.iter().product();
        let expected = rows * child_states;
        if table.len() != expected {
            return Err(Error::DomainError {
                expected,
                actual: table.len(),
            });
        }
        let mut table = table;
        for (r, row) in table.chunks_mut(child_states).enumerate() {
            if row.iter().any(|p| !(*p >= 0.0) || !p.is_finite()) {
                return Err(Error::invalid(format!("row {r} has a negative or non-finite entry")));
            }
            let total: f64 = row.iter().sum();
            if !(total > 0.0) {
                return Err(Error::invalid(format!("row {r} has no mass")));
            }
            row.iter_mut().for_each(|p| *p /= total);
        }
        Ok(ConditionalDiscrete {
            parent_dims,
            child_states,
            table,
        })
    }

    pub fn parent_dims(&self) -> &[usize] {
        &self.parent_dims
    }

    pub fn child_states(&self) -> usize {
        self.child_states
    }

    pub fn configurations(&self) -> usize {
        self.parent_dims.iter().product()
    }

    pub fn row(&self, configuration: usize) -> &[f64] {
        let start = configuration * self.child_states;
        &self.table[start..start + self.child_states]
    }

    /// Parent states for a flat configuration index.
    pub fn decode(&self, configuration: usize) -> Vec<usize> {
        let mut states = vec![0; self.parent_dims.len()];
        let mut rest = configuration;
        for (slot, &size) in states.iter_mut().zip(&self.parent_dims).rev() {
            *slot = rest % size;
            rest /= size;
        }
        states
    }

    pub fn probability(&self, child: usize, parents: &[usize]) -> f64 {
        if child >= self.child_states || parents.len() != self.parent_dims.len() {
            return 0.0;
        }
        let mut configuration = 0;
        for (&state, &size) in parents.iter().zip(&self.parent_dims) {
            if state >= size {
                return 0.0;
            }
            configuration = configuration * size + state;
        }
        self.row(configuration)[child]
    }
}

/// `x = Σ a_i u_i`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearCombination {
    weights: Vec<f64>,
}

impl LinearCombination {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() || weights.iter().any(|w| !w.is_finite()) {
            return Err(Error::invalid("linear combination needs finite coefficients"));
        }
        Ok(LinearCombination { weights })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// `x | u ~ N(F(u), noise_variance)` for a differentiable `F`.
#[derive(Debug, Clone)]
pub struct RegressionDensity {
    model: Arc<dyn RegressionModel>,
    noise_variance: f64,
}

impl RegressionDensity {
    pub fn new(model: Arc<dyn RegressionModel>, noise_variance: f64) -> Result<Self> {
        if !(noise_variance > 0.0) || !noise_variance.is_finite() {
            return Err(Error::invalid(format!(
                "regression noise variance must be positive, got {noise_variance}"
            )));
        }
        Ok(RegressionDensity {
            model,
            noise_variance,
        })
    }

    pub fn model(&self) -> &dyn RegressionModel {
        self.model.as_ref()
    }

    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }
}

#[derive(Debug, Clone)]
pub enum ConditionalModel {
    /// A root variable's prior.
    Marginal(Distribution),
    ConditionalGaussian(ConditionalGaussian),
    ConditionalDiscrete(ConditionalDiscrete),
    /// `x = Σ u_i`.
    Sum { parents: usize },
    LinearCombination(LinearCombination),
    RegressionDensity(RegressionDensity),
}

impl ConditionalModel {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            ConditionalModel::Marginal(_) => TypeTag::Marginal,
            ConditionalModel::ConditionalGaussian(_) => TypeTag::ConditionalGaussian,
            ConditionalModel::ConditionalDiscrete(_) => TypeTag::ConditionalDiscrete,
            ConditionalModel::Sum { .. } => TypeTag::Sum,
            ConditionalModel::LinearCombination(_) => TypeTag::LinearCombination,
            ConditionalModel::RegressionDensity(_) => TypeTag::RegressionDensity,
        }
    }

    pub fn parent_count(&self) -> usize {
        match self {
            ConditionalModel::Marginal(_) => 0,
            ConditionalModel::ConditionalGaussian(m) => m.weights.len(),
            ConditionalModel::ConditionalDiscrete(m) => m.parent_dims.len(),
            ConditionalModel::Sum { parents } => *parents,
            ConditionalModel::LinearCombination(m) => m.weights.len(),
            ConditionalModel::RegressionDensity(m) => m.model.input_dimension(),
        }
    }

    /// State count of a discrete child.
    pub fn child_states(&self) -> Option<usize> {
        match self {
            ConditionalModel::ConditionalDiscrete(m) => Some(m.child_states),
            ConditionalModel::Marginal(Distribution::Discrete(d)) => Some(d.len()),
            _ => None,
        }
    }

    /// `x` as a function of the parents, for deterministic models.
    pub fn deterministic_value(&self, parents: &[f64]) -> Option<f64> {
        match self {
            ConditionalModel::Sum { .. } => Some(parents.iter().sum()),
            ConditionalModel::LinearCombination(m) => {
                Some(m.weights.iter().zip(parents).map(|(a, u)| a * u).sum())
            }
            ConditionalModel::ConditionalGaussian(m) if m.noise_variance == 0.0 => {
                Some(m.mean_given(parents))
            }
            _ => None,
        }
    }

    /// `p(x | parents)`; `None` for deterministic models.
    pub fn conditional_density(&self, x: f64, parents: &[f64]) -> Option<f64> {
        match self {
            ConditionalModel::Marginal(d) => Some(d.density(x)),
            ConditionalModel::ConditionalGaussian(m) if m.noise_variance > 0.0 => Some(normal_pdf(
                x,
                m.mean_given(parents),
                m.noise_variance.sqrt(),
            )),
            ConditionalModel::ConditionalDiscrete(m) => {
                let child = as_state(x)?;
                let states = parents.iter().map(|&u| as_state(u)).collect::<Option<Vec<_>>>()?;
                Some(m.probability(child, &states))
            }
            ConditionalModel::RegressionDensity(m) => Some(normal_pdf(
                x,
                m.model.evaluate(parents),
                m.noise_variance.sqrt(),
            )),
            _ => None,
        }
    }

    /// Region holding all but `epsilon` of `p(x | parents)`.
    pub fn conditional_support(&self, parents: &[f64], epsilon: f64) -> Result<Option<Interval>> {
        let gaussian_support = |mean: f64, variance: f64| {
            let half = two_sided_z(epsilon) * variance.sqrt();
            Interval::new(mean - half, mean + half)
        };
        Ok(match self {
            ConditionalModel::Marginal(d) => d.effective_support(epsilon)?.hull(),
            ConditionalModel::ConditionalGaussian(m) => {
                Some(gaussian_support(m.mean_given(parents), m.noise_variance))
            }
            ConditionalModel::ConditionalDiscrete(m) => {
                Some(Interval::new(0.0, (m.child_states - 1) as f64))
            }
            ConditionalModel::RegressionDensity(m) => {
                Some(gaussian_support(m.model.evaluate(parents), m.noise_variance))
            }
            other => other.deterministic_value(parents).map(Interval::point),
        })
    }
}

fn as_state(x: f64) -> Option<usize> {
    let rounded = x.round();
    ((x - rounded).abs() <= 1e-9 && rounded >= 0.0).then_some(rounded as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Square;

    impl RegressionModel for Square {
        fn input_dimension(&self) -> usize {
            1
        }
        fn evaluate(&self, inputs: &[f64]) -> f64 {
            inputs[0] * inputs[0]
        }
        fn gradient(&self, inputs: &[f64]) -> Vec<f64> {
            vec![2.0 * inputs[0]]
        }
    }

    #[test]
    fn table_rows_are_normalized() {
        let cpt = ConditionalDiscrete::new(vec![2], 2, vec![1.0, 3.0, 2.0, 2.0]).unwrap();
        assert_eq!(cpt.row(0), &[0.25, 0.75]);
        assert_eq!(cpt.probability(1, &[1]), 0.5);
        assert!(ConditionalDiscrete::new(vec![2], 2, vec![0.0, 0.0, 1.0, 1.0]).is_err());
        assert!(matches!(
            ConditionalDiscrete::new(vec![2], 2, vec![1.0; 3]),
            Err(Error::DomainError { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn configurations_decode_last_parent_fastest() {
        let cpt = ConditionalDiscrete::new(vec![2, 3], 2, vec![1.0; 12]).unwrap();
        assert_eq!(cpt.configurations(), 6);
        assert_eq!(cpt.decode(0), vec![0, 0]);
        assert_eq!(cpt.decode(4), vec![1, 1]);
        assert_eq!(cpt.decode(5), vec![1, 2]);
    }

    #[test]
    fn deterministic_models_have_no_density() {
        let sum = ConditionalModel::Sum { parents: 2 };
        assert_eq!(sum.conditional_density(1.0, &[0.5, 0.5]), None);
        assert_eq!(sum.deterministic_value(&[0.5, 0.25]), Some(0.75));
        let support = sum.conditional_support(&[1.0, 2.0], 1e-3).unwrap().unwrap();
        assert_eq!((support.left, support.right), (3.0, 3.0));
    }

    #[test]
    fn regression_density_centres_on_model() {
        let model = ConditionalModel::RegressionDensity(
            RegressionDensity::new(Arc::new(Square), 0.25).unwrap(),
        );
        assert_eq!(model.parent_count(), 1);
        let p = model.conditional_density(4.0, &[2.0]).unwrap();
        assert!((p - normal_pdf(0.0, 0.0, 0.5)).abs() < 1e-15);
    }

    #[test]
    fn conditional_gaussian_validation() {
        assert!(ConditionalGaussian::new(vec![1.0], 0.0, -1.0).is_err());
        let cg = ConditionalGaussian::new(vec![2.0, -1.0], 1.0, 0.5).unwrap();
        assert_eq!(cg.mean_given(&[1.0, 3.0]), 0.0);
    }
}
