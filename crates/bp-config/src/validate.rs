//! Semantic validation for approximation settings.
//!
//! Parsing only checks shape; this module checks that tolerances are in
//! range, budgets are positive, and thresholds are usable.

use thiserror::Error;

use crate::approx::{ApproxConfig, SimilarityThresholds};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

fn invalid(field: &str, message: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

fn positive(field: &str, value: f64) -> ValidationResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(invalid(field, format!("Must be positive and finite, got {}", value)))
    }
}

/// Tail masses and tolerances live in (0, 1).
fn open_unit(field: &str, value: f64) -> ValidationResult<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("Must be in (0, 1), got {}", value)))
    }
}

fn at_least(field: &str, value: usize, min: usize) -> ValidationResult<()> {
    if value >= min {
        Ok(())
    } else {
        Err(invalid(field, format!("Must be at least {}, got {}", min, value)))
    }
}

fn validate_similarity(field: &str, t: &SimilarityThresholds) -> ValidationResult<()> {
    if !(t.mean >= 0.0 && t.mean.is_finite()) {
        return Err(invalid(
            &format!("{}.mean", field),
            format!("Must be nonnegative, got {}", t.mean),
        ));
    }
    if !(t.ratio >= 0.0 && t.ratio < 1.0) {
        return Err(invalid(
            &format!("{}.ratio", field),
            format!("Must be in [0, 1), got {}", t.ratio),
        ));
    }
    Ok(())
}

/// Validate an approximation configuration semantically.
pub fn validate_approx(config: &ApproxConfig) -> ValidationResult<()> {
    let integration = &config.integration;
    open_unit("integration.tolerance", integration.tolerance)?;
    at_least("integration.limit", integration.limit, 2)?;
    if !(integration.retry_factor >= 1.0 && integration.retry_factor.is_finite()) {
        return Err(invalid(
            "integration.retry_factor",
            format!("Must be >= 1, got {}", integration.retry_factor),
        ));
    }

    let fit = &config.fit;
    at_least("fit.max_iterations", fit.max_iterations, 1)?;
    if !(0.0..1.0).contains(&fit.min_mix_proportion) {
        return Err(invalid(
            "fit.min_mix_proportion",
            format!("Must be in [0, 1), got {}", fit.min_mix_proportion),
        ));
    }
    open_unit("fit.tolerance", fit.tolerance)?;
    if let Some(n) = fit.equivalent_sample_size {
        // Infinity is accepted and means no regularization.
        if !(n > 0.0) {
            return Err(invalid(
                "fit.equivalent_sample_size",
                format!("Must be positive, got {}", n),
            ));
        }
    }
    if let Some(threshold) = fit.convergence_threshold {
        positive("fit.convergence_threshold", threshold)?;
    }

    validate_similarity("similarity.general", &config.similarity.general)?;
    validate_similarity("similarity.regression", &config.similarity.regression)?;

    let product = &config.product;
    open_unit("product.support_epsilon", product.support_epsilon)?;
    open_unit("product.normalization_tolerance", product.normalization_tolerance)?;
    at_least("product.trim_steps", product.trim_steps, 2)?;
    at_least("product.support_probes", product.support_probes, 10)?;

    let convolution = &config.convolution;
    open_unit("convolution.min_dispersion_ratio", convolution.min_dispersion_ratio)?;
    at_least("convolution.grid_minimum", convolution.grid_minimum, 8)?;
    open_unit("convolution.support_epsilon", convolution.support_epsilon)?;

    let messages = &config.messages;
    open_unit("messages.parent_support_epsilon", messages.parent_support_epsilon)?;
    open_unit("messages.child_support_epsilon", messages.child_support_epsilon)?;
    at_least("messages.tabulation_points", messages.tabulation_points, 3)?;
    open_unit("messages.posterior_fit_tolerance", messages.posterior_fit_tolerance)?;
    positive("messages.lambda_search_radius", messages.lambda_search_radius)?;
    at_least("messages.lambda_search_points", messages.lambda_search_points, 10)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ValidationError) -> String {
        match err {
            ValidationError::InvalidValue { field, .. } => field,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_iterations() {
        let mut config = ApproxConfig::default();
        config.fit.max_iterations = 0;
        assert_eq!(field_of(validate_approx(&config).unwrap_err()), "fit.max_iterations");
    }

    #[test]
    fn rejects_retry_that_narrows() {
        let mut config = ApproxConfig::default();
        config.integration.retry_factor = 0.5;
        assert_eq!(
            field_of(validate_approx(&config).unwrap_err()),
            "integration.retry_factor"
        );
    }

    #[test]
    fn accepts_infinite_sample_size() {
        let mut config = ApproxConfig::default();
        config.fit.equivalent_sample_size = Some(f64::INFINITY);
        validate_approx(&config).unwrap();
        config.fit.equivalent_sample_size = Some(0.0);
        assert_eq!(
            field_of(validate_approx(&config).unwrap_err()),
            "fit.equivalent_sample_size"
        );
    }

    #[test]
    fn rejects_ratio_of_one() {
        let mut config = ApproxConfig::default();
        config.similarity.regression.ratio = 1.0;
        assert_eq!(
            field_of(validate_approx(&config).unwrap_err()),
            "similarity.regression.ratio"
        );
    }

    #[test]
    fn rejects_epsilon_out_of_range() {
        let mut config = ApproxConfig::default();
        config.product.support_epsilon = 1.0;
        assert_eq!(
            field_of(validate_approx(&config).unwrap_err()),
            "product.support_epsilon"
        );
    }

    #[test]
    fn rejects_unbounded_lambda_search() {
        let mut config = ApproxConfig::default();
        config.messages.lambda_search_radius = f64::INFINITY;
        assert_eq!(
            field_of(validate_approx(&config).unwrap_err()),
            "messages.lambda_search_radius"
        );
    }
}
