//! Monotone piecewise-cubic interpolation.
//!
//! Slopes at interior knots use the weighted harmonic mean of the adjacent
//! secants (Fritsch-Butland form), and are zero wherever the data has a
//! local extremum, so the interpolant never overshoots the tabulated values.
//! End slopes are zero. Interpolating nonnegative data therefore yields a
//! nonnegative function, which is what tabulated densities need.

use bp_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Cubic pieces `f[i] + d[i]·t + c2[i]·t² + c3[i]·t³` with `t = x - x[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonotoneSpline {
    x: Vec<f64>,
    f: Vec<f64>,
    d: Vec<f64>,
    c2: Vec<f64>,
    c3: Vec<f64>,
}

impl MonotoneSpline {
    /// Fits the spline through `(x[i], f[i])`; `x` must be strictly increasing.
    pub fn new(x: &[f64], f: &[f64]) -> Result<Self> {
        if x.len() != f.len() {
            return Err(Error::invalid(format!(
                "spline knots and values differ in length ({} vs {})",
                x.len(),
                f.len()
            )));
        }
        if x.len() < 2 {
            return Err(Error::invalid("spline needs at least two knots"));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(Error::invalid("spline knots must be strictly increasing"));
        }

        let n = x.len();
        let dx: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let df: Vec<f64> = f.windows(2).map(|w| w[1] - w[0]).collect();

        let mut d = vec![0.0; n];
        for i in 1..n - 1 {
            let s1 = df[i - 1] / dx[i - 1];
            let s2 = df[i] / dx[i];
            if s1 * s2 > 0.0 {
                let alpha = (1.0 + dx[i] / (dx[i - 1] + dx[i])) / 3.0;
                d[i] = s1 * s2 / (alpha * s2 + (1.0 - alpha) * s1);
            }
        }

        let mut c2 = vec![0.0; n];
        let mut c3 = vec![0.0; n];
        for i in 0..n - 1 {
            let h = dx[i];
            c2[i] = 3.0 * df[i] / (h * h) - (2.0 * d[i] + d[i + 1]) / h;
            c3[i] = -2.0 * df[i] / (h * h * h) + (d[i] + d[i + 1]) / (h * h);
        }

        Ok(MonotoneSpline {
            x: x.to_vec(),
            f: f.to_vec(),
            d,
            c2,
            c3,
        })
    }

    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    pub fn values(&self) -> &[f64] {
        &self.f
    }

    pub fn left(&self) -> f64 {
        self.x[0]
    }

    pub fn right(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    /// Index of the piece containing `x`, clamped to the table.
    fn piece(&self, x: f64) -> usize {
        let pieces = self.x.len() - 1;
        match self.x.partition_point(|&k| k <= x) {
            0 => 0,
            i => (i - 1).min(pieces - 1),
        }
    }

    /// Value at `x`; zero outside the knot range.
    pub fn eval(&self, x: f64) -> f64 {
        if x < self.left() || x > self.right() {
            return 0.0;
        }
        let i = self.piece(x);
        let t = x - self.x[i];
        self.f[i] + t * (self.d[i] + t * (self.c2[i] + t * self.c3[i]))
    }

    /// ∫ t^0 of piece `i` from its left knot over a width `h`.
    fn piece_mass(&self, i: usize, h: f64) -> f64 {
        let (h2, h3, h4) = (h * h, h * h * h, h * h * h * h);
        h * self.f[i] + h2 * self.d[i] / 2.0 + h3 * self.c2[i] / 3.0 + h4 * self.c3[i] / 4.0
    }

    /// Integral from the left knot to `x`.
    pub fn integral_to(&self, x: f64) -> f64 {
        if x <= self.left() {
            return 0.0;
        }
        let x = x.min(self.right());
        let last = self.piece(x);
        let mut sum = 0.0;
        for i in 0..last {
            sum += self.piece_mass(i, self.x[i + 1] - self.x[i]);
        }
        sum + self.piece_mass(last, x - self.x[last])
    }

    /// Integral over the whole knot range.
    pub fn total(&self) -> f64 {
        self.integral_to(self.right())
    }

    /// First and second raw moments `(∫x·s, ∫x²·s)` over the knot range.
    pub fn raw_moments(&self) -> (f64, f64) {
        let mut m1 = 0.0;
        let mut m2 = 0.0;
        for i in 0..self.x.len() - 1 {
            let h = self.x[i + 1] - self.x[i];
            let (h2, h3, h4, h5, h6) = (h * h, h.powi(3), h.powi(4), h.powi(5), h.powi(6));
            let (f, d, a2, a3) = (self.f[i], self.d[i], self.c2[i], self.c3[i]);
            let xr = self.x[i + 1];
            // Integrate by parts against the right knot.
            let t1 = h * f + h2 * d / 2.0 + h3 * a2 / 3.0 + h4 * a3 / 4.0;
            let t2 = h2 * f / 2.0 + h3 * d / 6.0 + h4 * a2 / 12.0 + h5 * a3 / 20.0;
            let t3 = h3 * f / 6.0 + h4 * d / 24.0 + h5 * a2 / 60.0 + h6 * a3 / 120.0;
            m1 += xr * t1 - t2;
            m2 += xr * xr * t1 - 2.0 * xr * t2 + 2.0 * t3;
        }
        (m1, m2)
    }

    /// Rescales every coefficient by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in self
            .f
            .iter_mut()
            .chain(self.d.iter_mut())
            .chain(self.c2.iter_mut())
            .chain(self.c3.iter_mut())
        {
            *v *= factor;
        }
    }
}
