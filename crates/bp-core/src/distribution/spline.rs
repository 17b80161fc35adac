//! Densities tabulated on a grid and interpolated with a monotone spline.

use bp_common::{Error, Result};
use bp_math::{Interval, MonotoneSpline};
use serde::{Deserialize, Serialize};

use super::gaussian::check_epsilon;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineDensity {
    spline: MonotoneSpline,
    mean: f64,
    variance: f64,
}

impl SplineDensity {
    /// Interpolates `(x[i], p[i])` and rescales to unit mass.
    ///
    /// Negative tabulated values are clipped to zero first.
    pub fn new(x: &[f64], p: &[f64]) -> Result<Self> {
        let clipped: Vec<f64> = p
            .iter()
            .map(|v| if v.is_finite() { v.max(0.0) } else { 0.0 })
            .collect();
        let mut spline = MonotoneSpline::new(x, &clipped)?;
        let total = spline.total();
        if !(total > 0.0) || !total.is_finite() {
            return Err(Error::degenerate("tabulated density has no mass"));
        }
        spline.scale(1.0 / total);
        let (m1, m2) = spline.raw_moments();
        Ok(SplineDensity {
            spline,
            mean: m1,
            variance: (m2 - m1 * m1).max(0.0),
        })
    }

    pub fn knots(&self) -> &[f64] {
        self.spline.knots()
    }

    pub fn density(&self, x: f64) -> f64 {
        self.spline.eval(x).max(0.0)
    }

    pub fn cdf(&self, x: f64) -> f64 {
        self.spline.integral_to(x).clamp(0.0, 1.0)
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Interval between the `epsilon / 2` and `1 - epsilon / 2` quantiles.
    pub fn effective_support(&self, epsilon: f64) -> Result<Interval> {
        check_epsilon(epsilon)?;
        let left = self.quantile(0.5 * epsilon);
        let right = self.quantile(1.0 - 0.5 * epsilon);
        Ok(Interval::new(left, right))
    }

    /// Inverse CDF by bisection over the knot range.
    pub fn quantile(&self, p: f64) -> f64 {
        let (mut lo, mut hi) = (self.spline.left(), self.spline.right());
        for _ in 0..64 {
            let mid = 0.5 * (lo + hi);
            if self.cdf(mid) < p {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }
}
