//! Logging configuration.
//!
//! The engine's verbosity is resolved once, in order: an explicit level,
//! then `BP_LOG`, then `RUST_LOG`, then `info`. Only `RUST_LOG` may carry
//! full filter directives; every other source scopes a single level to
//! `bp_core`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const ENGINE_TARGET: &str = "bp_core";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event.
    Jsonl,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" | "console" | "pretty" => Ok(LogFormat::Human),
            "jsonl" | "json" | "structured" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {s}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    /// Per-iteration fitting traces and helper selection.
    Debug,
    #[default]
    Info,
    /// Integration retries and stale message references.
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the effective level came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelSource {
    Default,
    RustLog,
    BpLog,
    Explicit,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    pub source: LevelSource,
    /// Raw `RUST_LOG` directives, kept only when `RUST_LOG` decided the
    /// level.
    pub directives: Option<String>,
    /// Timestamps on human output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            source: LevelSource::Default,
            directives: None,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Reads `BP_LOG`, `RUST_LOG` and `BP_LOG_FORMAT`; `Some` arguments win.
    pub fn from_env(level: Option<LogLevel>, format: Option<LogFormat>) -> Self {
        Self::from_vars(|name| std::env::var(name).ok(), level, format)
    }

    /// [`LogConfig::from_env`] over an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F, level: Option<LogLevel>, format: Option<LogFormat>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LogConfig::default();

        let bp_log = lookup("BP_LOG").and_then(|v| v.parse::<LogLevel>().ok());
        if let Some(explicit) = level {
            config.level = explicit;
            config.source = LevelSource::Explicit;
        } else if let Some(parsed) = bp_log {
            config.level = parsed;
            config.source = LevelSource::BpLog;
        } else if let Some(raw) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
            if let Some(parsed) = engine_level_in(&raw) {
                config.level = parsed;
            }
            config.source = LevelSource::RustLog;
            config.directives = Some(raw);
        }

        config.format = format
            .or_else(|| lookup("BP_LOG_FORMAT").and_then(|v| v.parse().ok()))
            .unwrap_or_default();
        config
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Overrides the level as an explicit choice, dropping any `RUST_LOG`
    /// directives.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self.source = LevelSource::Explicit;
        self.directives = None;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// The subscriber filter. Malformed `RUST_LOG` directives fall back to
    /// the resolved level.
    pub fn filter(&self) -> EnvFilter {
        let scoped = || EnvFilter::new(format!("{ENGINE_TARGET}={}", self.level));
        match &self.directives {
            Some(raw) => EnvFilter::try_new(raw).unwrap_or_else(|_| scoped()),
            None => scoped(),
        }
    }
}

/// Level `RUST_LOG` sets for the engine: a `bp_core=` directive if there is
/// one, else the bare default level.
fn engine_level_in(directives: &str) -> Option<LogLevel> {
    let mut bare = None;
    for directive in directives.split(',').map(str::trim) {
        match directive.split_once('=') {
            Some((target, level)) if target == ENGINE_TARGET => return level.parse().ok(),
            Some(_) => {}
            None => bare = directive.parse().ok().or(bare),
        }
    }
    bare
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn formats_and_levels_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(" Warning ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }

    #[test]
    fn explicit_level_beats_rust_log() {
        let config = LogConfig::from_vars(vars(&[("RUST_LOG", "error")]), Some(LogLevel::Debug), None);
        assert_eq!(config.source, LevelSource::Explicit);
        assert!(config.directives.is_none());
        assert_eq!(config.filter().max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn bp_log_beats_rust_log() {
        let config = LogConfig::from_vars(
            vars(&[("BP_LOG", "warn"), ("RUST_LOG", "trace")]),
            None,
            None,
        );
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.source, LevelSource::BpLog);
        assert_eq!(config.filter().max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn rust_log_directives_are_kept() {
        let config = LogConfig::from_vars(
            vars(&[("RUST_LOG", "warn,bp_core::approximation=trace")]),
            None,
            None,
        );
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.source, LevelSource::RustLog);
        assert_eq!(config.filter().max_level_hint(), Some(LevelFilter::TRACE));

        let scoped = LogConfig::from_vars(vars(&[("RUST_LOG", "info,bp_core=debug")]), None, None);
        assert_eq!(scoped.level, LogLevel::Debug);
    }

    #[test]
    fn unparsable_bp_log_falls_through() {
        let config = LogConfig::from_vars(
            vars(&[("BP_LOG", "loud"), ("BP_LOG_FORMAT", "json")]),
            None,
            None,
        );
        assert_eq!(config.source, LevelSource::Default);
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn with_level_drops_directives() {
        let config = LogConfig::from_vars(vars(&[("RUST_LOG", "trace")]), None, None)
            .with_level(LogLevel::Error)
            .with_timestamps(false);
        assert!(config.directives.is_none());
        assert_eq!(config.filter().max_level_hint(), Some(LevelFilter::ERROR));
        assert!(!config.timestamps);
    }
}
