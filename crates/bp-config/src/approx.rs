//! Tuning constants for the approximation engine.
//!
//! Every empirically chosen constant (iteration budget, pruning thresholds,
//! integration tolerances, grid sizes) lives here so callers can override it
//! from a file instead of editing code. Files may be partial: missing fields
//! take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::validate::{validate_approx, ValidationError, ValidationResult};

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ApproxConfig {
    pub integration: IntegrationConfig,
    pub fit: FitConfig,
    pub similarity: SimilarityConfig,
    pub product: ProductConfig,
    pub convolution: ConvolutionConfig,
    pub messages: MessageConfig,
}

/// Quadrature tolerances and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Absolute and relative tolerance for general expectations.
    pub tolerance: f64,
    /// Maximum subintervals per call.
    pub limit: usize,
    /// Factor applied to the tolerance for the single retry.
    pub retry_factor: f64,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        IntegrationConfig {
            tolerance: 1e-3,
            limit: 30,
            retry_factor: 100.0,
        }
    }
}

/// EM-on-a-density settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Fixed iteration budget.
    pub max_iterations: usize,
    /// Components lighter than this are dropped after each iteration.
    pub min_mix_proportion: f64,
    /// Quadrature tolerance for the moment integrals.
    pub tolerance: f64,
    /// Equivalent sample size of the conjugate prior; `None` disables
    /// regularization.
    pub equivalent_sample_size: Option<f64>,
    /// Stop early once cross-entropy moves less than this between iterations.
    pub convergence_threshold: Option<f64>,
    /// Record mixing proportions and cross-entropy after every iteration.
    pub trace: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            max_iterations: 10,
            min_mix_proportion: 0.005,
            tolerance: 1e-5,
            equivalent_sample_size: None,
            convergence_threshold: None,
            trace: false,
        }
    }
}

/// Near-duplicate test for two mixture components.
///
/// Components `i` and `j` are duplicates when
/// `|mu_i - mu_j| / s_ij < mean` and `sigma_i / sigma_j` lies strictly
/// within `(1 - ratio, 1 + ratio)`, where `s_ij` is the harmonic-combined
/// scale `sqrt(1 / (1/sigma_i² + 1/sigma_j²))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityThresholds {
    pub mean: f64,
    pub ratio: f64,
}

impl SimilarityThresholds {
    /// Thresholds for general fitting.
    pub fn general() -> Self {
        SimilarityThresholds {
            mean: 0.25,
            ratio: 0.2,
        }
    }

    /// Tighter thresholds for the regression-density pi approximation.
    pub fn regression() -> Self {
        SimilarityThresholds {
            mean: 0.075,
            ratio: 0.06,
        }
    }
}

/// Both call sites' duplicate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub general: SimilarityThresholds,
    pub regression: SimilarityThresholds,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            general: SimilarityThresholds::general(),
            regression: SimilarityThresholds::regression(),
        }
    }
}

/// Normalization of pointwise products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    /// Tail mass ignored when collecting each factor's support.
    pub support_epsilon: f64,
    /// Tolerance for the normalizing constant.
    pub normalization_tolerance: f64,
    /// Scan resolution used to trim zero-density ends of the support.
    pub trim_steps: usize,
    /// Probe points for the effective-support window search.
    pub support_probes: usize,
}

impl Default for ProductConfig {
    fn default() -> Self {
        ProductConfig {
            support_epsilon: 1e-6,
            normalization_tolerance: 1e-5,
            trim_steps: 100,
            support_probes: 200,
        }
    }
}

/// Numerical convolution for sums of arbitrary densities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvolutionConfig {
    /// Inputs narrower than this fraction of the widest are treated as
    /// point shifts.
    pub min_dispersion_ratio: f64,
    /// Grid points across six standard deviations of the narrowest input.
    pub grid_minimum: usize,
    pub support_epsilon: f64,
}

impl Default for ConvolutionConfig {
    fn default() -> Self {
        ConvolutionConfig {
            min_dispersion_ratio: 1.0 / 50.0,
            grid_minimum: 256,
            support_epsilon: 1e-4,
        }
    }
}

/// Settings for message helpers that fall back to numerics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    /// Tail mass ignored when integrating over a parent.
    pub parent_support_epsilon: f64,
    /// Tail mass ignored when bounding a child's conditional density.
    pub child_support_epsilon: f64,
    /// Knots used to tabulate a numerically integrated pi density.
    pub tabulation_points: usize,
    /// Tolerance for fitting a posterior with no closed form.
    pub posterior_fit_tolerance: f64,
    /// Half-width of the window searched for a numerically computed
    /// lambda message; the recipient's pi is not available to bound it.
    pub lambda_search_radius: f64,
    /// Grid points per pass of that search.
    pub lambda_search_points: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        MessageConfig {
            parent_support_epsilon: 1e-4,
            child_support_epsilon: 1e-4,
            tabulation_points: 129,
            posterior_fit_tolerance: 1e-5,
            lambda_search_radius: 50.0,
            lambda_search_points: 801,
        }
    }
}

/// Serialized formats accepted by [`ApproxConfig::from_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    /// Picks a format from the file extension.
    pub fn from_path(path: &Path) -> Option<ConfigFormat> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "json" => Some(ConfigFormat::Json),
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            _ => None,
        }
    }
}

impl ApproxConfig {
    /// Fewer iterations and looser tolerances for interactive use.
    pub fn fast() -> Self {
        ApproxConfig {
            integration: IntegrationConfig {
                tolerance: 1e-2,
                ..IntegrationConfig::default()
            },
            fit: FitConfig {
                max_iterations: 5,
                tolerance: 1e-4,
                ..FitConfig::default()
            },
            messages: MessageConfig {
                tabulation_points: 65,
                posterior_fit_tolerance: 1e-4,
                ..MessageConfig::default()
            },
            ..ApproxConfig::default()
        }
    }

    /// More iterations and tighter tolerances for offline runs.
    pub fn precise() -> Self {
        ApproxConfig {
            integration: IntegrationConfig {
                tolerance: 1e-5,
                limit: 100,
                ..IntegrationConfig::default()
            },
            fit: FitConfig {
                max_iterations: 25,
                tolerance: 1e-7,
                ..FitConfig::default()
            },
            product: ProductConfig {
                support_epsilon: 1e-8,
                normalization_tolerance: 1e-7,
                ..ProductConfig::default()
            },
            messages: MessageConfig {
                tabulation_points: 257,
                posterior_fit_tolerance: 1e-7,
                ..MessageConfig::default()
            },
            ..ApproxConfig::default()
        }
    }

    /// Reads and validates a configuration file.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| ValidationError::UnsupportedFormat(path.display().to_string()))?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_str_as(&content, format)
    }

    /// Parses and validates a configuration string.
    pub fn from_str_as(content: &str, format: ConfigFormat) -> ValidationResult<Self> {
        let config: ApproxConfig = match format {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ValidationError::ParseError(format!("Invalid YAML: {}", e)))?,
        };
        validate_approx(&config)?;
        Ok(config)
    }
}
