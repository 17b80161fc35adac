//! Adaptive integration over interval sets.
//!
//! One QAGS call per interval, summed. [`Integrator::integrate_with_retry`]
//! gives a failed integral exactly one more try at a looser tolerance
//! before the failure reaches the caller.

use bp_common::{Error, Result};
use bp_config::IntegrationConfig;
use bp_math::{qags, Interval, IntervalSet, QuadratureOptions};
use tracing::warn;

use crate::logging::event_names;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    options: QuadratureOptions,
    retry_factor: f64,
}

impl Default for Integrator {
    fn default() -> Self {
        Integrator::from_config(&IntegrationConfig::default())
    }
}

impl Integrator {
    pub fn new(tolerance: f64, limit: usize, retry_factor: f64) -> Self {
        Integrator {
            options: QuadratureOptions::with_tolerance(tolerance, limit),
            retry_factor,
        }
    }

    pub fn from_config(config: &IntegrationConfig) -> Self {
        Integrator::new(config.tolerance, config.limit, config.retry_factor)
    }

    /// Same limit and retry policy, different tolerance.
    pub fn with_tolerance(&self, tolerance: f64) -> Self {
        Integrator::new(tolerance, self.options.limit, self.retry_factor)
    }

    pub fn tolerance(&self) -> f64 {
        self.options.epsabs
    }

    pub fn options(&self) -> &QuadratureOptions {
        &self.options
    }

    /// Integral over one interval; a zero-width interval contributes zero.
    pub fn integrate<F: FnMut(f64) -> f64>(&self, f: F, interval: &Interval) -> Result<f64> {
        integrate_interval(f, interval, &self.options)
    }

    /// Sum of the integrals over each member of `set`.
    pub fn integrate_over_intervals<F: FnMut(f64) -> f64>(
        &self,
        f: F,
        set: &IntervalSet,
    ) -> Result<f64> {
        integrate_set(f, set, &self.options)
    }

    /// As [`Self::integrate_over_intervals`], retrying once at
    /// `retry_factor` times the tolerance after a convergence failure.
    pub fn integrate_with_retry<F: FnMut(f64) -> f64>(
        &self,
        mut f: F,
        set: &IntervalSet,
    ) -> Result<f64> {
        match integrate_set(&mut f, set, &self.options) {
            Err(Error::DifficultIntegral {
                left,
                right,
                abserr,
                tolerance,
                reason,
            }) => {
                let widened = self.options.widened(self.retry_factor);
                warn!(
                    event = event_names::INTEGRAL_RETRY,
                    left,
                    right,
                    abserr,
                    tolerance,
                    retry_tolerance = widened.epsabs,
                    reason = %reason,
                    "integral did not converge; retrying at a looser tolerance"
                );
                integrate_set(&mut f, set, &widened).inspect_err(|e| {
                    warn!(event = event_names::INTEGRAL_FAILED, error = %e, "retry failed");
                })
            }
            other => other,
        }
    }
}

fn integrate_interval<F: FnMut(f64) -> f64>(
    f: F,
    interval: &Interval,
    options: &QuadratureOptions,
) -> Result<f64> {
    if interval.width() == 0.0 {
        return Ok(0.0);
    }
    qags(f, interval.left, interval.right, options).map(|q| q.value)
}

fn integrate_set<F: FnMut(f64) -> f64>(
    mut f: F,
    set: &IntervalSet,
    options: &QuadratureOptions,
) -> Result<f64> {
    let mut total = 0.0;
    for interval in set.iter() {
        total += integrate_interval(&mut f, interval, options)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bp_math::normal_pdf;

    #[test]
    fn constant_over_disjoint_intervals() {
        let set = IntervalSet::from_pairs(&[(0.0, 1.0), (2.0, 3.0)]);
        let value = Integrator::default()
            .integrate_over_intervals(|_| 1.0, &set)
            .unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn point_intervals_contribute_nothing() {
        let set = IntervalSet::from_pairs(&[(1.0, 1.0), (0.0, 2.0)]);
        let value = Integrator::default()
            .integrate_over_intervals(|x| x, &set)
            .unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn gaussian_mass_over_wide_support() {
        let set = IntervalSet::single(-10.0, 10.0);
        let value = Integrator::new(1e-8, 50, 100.0)
            .integrate_with_retry(|x| normal_pdf(x, 0.0, 1.0), &set)
            .unwrap();
        assert!((value - 1.0).abs() < 1e-8);
    }

    #[test]
    fn retry_rescues_an_unreachable_tolerance() {
        // 1e-20 is below the roundoff floor of a 21-point rule; 1e-10 is not.
        let set = IntervalSet::single(0.0, 1.0);
        let strict = Integrator::new(1e-20, 30, 1e10);
        assert!(matches!(
            strict.integrate_over_intervals(|x| x * x, &set),
            Err(Error::DifficultIntegral { .. })
        ));
        let value = strict.integrate_with_retry(|x| x * x, &set).unwrap();
        assert!((value - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn second_failure_propagates() {
        let integrator = Integrator::new(1e-20, 30, 1.0);
        let set = IntervalSet::single(0.0, 1.0);
        let result = integrator.integrate_with_retry(|x| x * x, &set);
        assert!(matches!(result, Err(Error::DifficultIntegral { .. })));
    }
}
