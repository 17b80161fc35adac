//! Named configuration presets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::approx::ApproxConfig;

/// Available configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    /// Reference constants: 10 iterations, 1e-5 fitting tolerance.
    Standard,
    /// Half the iterations, looser tolerances, coarser tabulation.
    Fast,
    /// More iterations, tighter tolerances, finer tabulation.
    Precise,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] =
        &[PresetName::Standard, PresetName::Fast, PresetName::Precise];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Standard => "standard",
            PresetName::Fast => "fast",
            PresetName::Precise => "precise",
        }
    }

    /// Parse preset name from string.
    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().as_str() {
            "standard" | "default" => Some(PresetName::Standard),
            "fast" | "quick" => Some(PresetName::Fast),
            "precise" | "accurate" => Some(PresetName::Precise),
            _ => None,
        }
    }

    pub fn config(&self) -> ApproxConfig {
        match self {
            PresetName::Standard => ApproxConfig::default(),
            PresetName::Fast => ApproxConfig::fast(),
            PresetName::Precise => ApproxConfig::precise(),
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| format!("unknown preset: {}", s))
    }
}
