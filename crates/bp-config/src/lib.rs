//! Configuration loading and validation for the approximation engine.
//!
//! This crate provides:
//! - Typed settings for quadrature, fitting, pruning, and products
//! - Named presets
//! - Resolution from explicit paths, environment, or defaults
//! - Semantic validation

pub mod approx;
pub mod preset;
pub mod resolve;
pub mod validate;

pub use approx::{
    ApproxConfig, ConfigFormat, ConvolutionConfig, FitConfig, IntegrationConfig, MessageConfig,
    ProductConfig, SimilarityConfig, SimilarityThresholds,
};
pub use preset::PresetName;
pub use resolve::{resolve_config, ConfigSource, ResolvedConfig};
pub use validate::{validate_approx, ValidationError, ValidationResult};
