//! Normal-distribution kernels and log-domain helpers.

use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::{PI, SQRT_2};

/// 0.5 * ln(2π)
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Differential entropy of the standard normal, 0.5 * ln(2πe).
pub const STANDARD_NORMAL_ENTROPY: f64 = 1.418_938_533_204_672_7;

/// Density of `N(mu, sigma²)` at `x`.
pub fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt())
}

/// Log density of `N(mu, sigma²)` at `x`.
pub fn normal_ln_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    -0.5 * z * z - sigma.ln() - LN_SQRT_2PI
}

/// Standard normal CDF.
pub fn standard_normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Standard normal quantile for `p` in (0, 1).
pub fn standard_normal_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// Half-width, in standard deviations, of the central interval holding
/// `1 - epsilon` of the mass.
pub fn two_sided_z(epsilon: f64) -> f64 {
    standard_normal_quantile(1.0 - 0.5 * epsilon)
}

/// Stable `ln(Σ exp(values))`.
///
/// Empty input and all-`-inf` input give `-inf`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_nan() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
