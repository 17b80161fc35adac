//! Numerical kernels for Gaussian-mixture belief propagation.

pub mod math;

pub use math::convolve::{convolve, correlate_valid, normalized};
pub use math::intervals::{Interval, IntervalSet};
pub use math::normal::*;
pub use math::quadrature::{qags, Quadrature, QuadratureFailure, QuadratureOptions};
pub use math::spline::MonotoneSpline;
