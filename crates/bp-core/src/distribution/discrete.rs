//! Finite distributions over integer states, possibly multidimensional.

use bp_common::{Error, Result};
use bp_math::{normalized, Interval};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Probability table over `Π dimensions` states, stored row-major with the
/// last dimension varying fastest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrete {
    dimensions: Vec<usize>,
    probabilities: Vec<f64>,
}

impl Discrete {
    /// Builds a table and normalizes it to unit mass.
    pub fn new(dimensions: Vec<usize>, probabilities: Vec<f64>) -> Result<Self> {
        if dimensions.is_empty() || dimensions.contains(&0) {
            return Err(Error::invalid(format!(
                "discrete dimensions must be nonempty and positive, got {dimensions:?}"
            )));
        }
        let expected: usize = dimensions.iter().product();
        if probabilities.len() != expected {
            return Err(Error::DomainError {
                expected,
                actual: probabilities.len(),
            });
        }
        if probabilities.iter().any(|p| !(*p >= 0.0) || !p.is_finite()) {
            return Err(Error::invalid("discrete probabilities must be finite and nonnegative"));
        }
        let probabilities = normalized(&probabilities)
            .ok_or_else(|| Error::degenerate("discrete probabilities sum to zero"))?;
        Ok(Discrete {
            dimensions,
            probabilities,
        })
    }

    pub fn from_probabilities(probabilities: Vec<f64>) -> Result<Self> {
        Discrete::new(vec![probabilities.len()], probabilities)
    }

    /// All mass on `index` out of `states`.
    pub fn point_mass(states: usize, index: usize) -> Result<Self> {
        if index >= states {
            return Err(Error::invalid(format!(
                "state {index} out of range for {states} states"
            )));
        }
        let mut p = vec![0.0; states];
        p[index] = 1.0;
        Discrete::from_probabilities(p)
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn probability(&self, index: usize) -> f64 {
        self.probabilities.get(index).copied().unwrap_or(0.0)
    }

    /// Mass at `x` read as a flat state index; zero off the integers.
    pub fn density(&self, x: f64) -> f64 {
        let index = x.round();
        if (x - index).abs() > 1e-9 || index < 0.0 {
            return 0.0;
        }
        self.probability(index as usize)
    }

    /// Mass at a multi-index.
    pub fn density_at(&self, x: &[f64]) -> Result<f64> {
        if x.len() != self.dimensions.len() {
            return Err(Error::DomainError {
                expected: self.dimensions.len(),
                actual: x.len(),
            });
        }
        let mut flat = 0usize;
        for (&coordinate, &size) in x.iter().zip(&self.dimensions) {
            let index = coordinate.round();
            if (coordinate - index).abs() > 1e-9 || index < 0.0 || index as usize >= size {
                return Ok(0.0);
            }
            flat = flat * size + index as usize;
        }
        Ok(self.probabilities[flat])
    }

    pub fn mean(&self) -> f64 {
        self.probabilities
            .iter()
            .enumerate()
            .map(|(i, p)| i as f64 * p)
            .sum()
    }

    pub fn variance(&self) -> f64 {
        let mean = self.mean();
        self.probabilities
            .iter()
            .enumerate()
            .map(|(i, p)| (i as f64 - mean).powi(2) * p)
            .sum()
    }

    /// Smallest index range that drops at most `epsilon / 2` from each tail.
    pub fn effective_support(&self, epsilon: f64) -> Interval {
        let tail = 0.5 * epsilon;
        let mut first = 0;
        let mut cumulative = 0.0;
        for (i, p) in self.probabilities.iter().enumerate() {
            cumulative += p;
            if cumulative > tail {
                first = i;
                break;
            }
        }
        let mut last = self.len() - 1;
        cumulative = 0.0;
        for (i, p) in self.probabilities.iter().enumerate().rev() {
            cumulative += p;
            if cumulative > tail {
                last = i;
                break;
            }
        }
        Interval::new(first as f64, last.max(first) as f64)
    }

    /// Elementwise product, renormalized.
    pub fn product(&self, other: &Discrete) -> Result<Discrete> {
        if self.len() != other.len() {
            return Err(Error::invalid(format!(
                "discrete product over {} and {} states",
                self.len(),
                other.len()
            )));
        }
        let raw: Vec<f64> = self
            .probabilities
            .iter()
            .zip(&other.probabilities)
            .map(|(a, b)| a * b)
            .collect();
        Discrete::new(self.dimensions.clone(), raw)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.random();
        let mut cumulative = 0.0;
        for (i, p) in self.probabilities.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                return i as f64;
            }
        }
        (self.len() - 1) as f64
    }
}
