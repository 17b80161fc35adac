//! Configuration resolution.
//!
//! Resolution order: explicit path → `BP_APPROX_CONFIG` → `BP_APPROX_PRESET`
//! → built-in defaults.

use std::path::{Path, PathBuf};

use crate::approx::ApproxConfig;
use crate::preset::PresetName;
use crate::validate::{ValidationError, ValidationResult};

/// Environment variable naming a config file.
pub const ENV_CONFIG_PATH: &str = "BP_APPROX_CONFIG";
/// Environment variable naming a preset.
pub const ENV_PRESET: &str = "BP_APPROX_PRESET";

/// Where the active configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path passed by the caller.
    Explicit(PathBuf),
    /// Path taken from `BP_APPROX_CONFIG`.
    Environment(PathBuf),
    /// Preset named by `BP_APPROX_PRESET`.
    Preset(PresetName),
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit(p) => write!(f, "explicit path {}", p.display()),
            ConfigSource::Environment(p) => write!(f, "{} ({})", ENV_CONFIG_PATH, p.display()),
            ConfigSource::Preset(name) => write!(f, "preset {}", name),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A loaded configuration with its provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ApproxConfig,
    pub source: ConfigSource,
}

/// Resolve the engine configuration.
pub fn resolve_config(explicit: Option<&Path>) -> ValidationResult<ResolvedConfig> {
    if let Some(path) = explicit {
        return Ok(ResolvedConfig {
            config: ApproxConfig::from_file(path)?,
            source: ConfigSource::Explicit(path.to_path_buf()),
        });
    }

    if let Some(path) = std::env::var_os(ENV_CONFIG_PATH).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(path);
        return Ok(ResolvedConfig {
            config: ApproxConfig::from_file(&path)?,
            source: ConfigSource::Environment(path),
        });
    }

    if let Ok(name) = std::env::var(ENV_PRESET) {
        let preset = PresetName::parse(&name).ok_or_else(|| ValidationError::InvalidValue {
            field: ENV_PRESET.to_string(),
            message: format!("Unknown preset '{}'", name),
        })?;
        return Ok(ResolvedConfig {
            config: preset.config(),
            source: ConfigSource::Preset(preset),
        });
    }

    Ok(ResolvedConfig {
        config: ApproxConfig::default(),
        source: ConfigSource::BuiltinDefault,
    })
}
