//! Core math modules.

pub mod convolve;
pub mod intervals;
pub mod normal;
pub mod quadrature;
pub mod spline;
