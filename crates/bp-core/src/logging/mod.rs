//! Structured logging for the message-passing engine.
//!
//! Human-readable console output for interactive use, JSON lines for
//! pipelines. All output goes to stderr. The engine itself only emits
//! `tracing` events; installing a subscriber is the caller's choice.
//!
//! ```ignore
//! use bp_core::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::from_env(None, None));
//! ```

pub mod config;
pub mod events;

pub use config::{LevelSource, LogConfig, LogFormat, LogLevel};
pub use events::event_names;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::fmt;

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = config.filter();

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);
            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init()
                    .is_ok()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()
                    .is_ok()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .is_ok(),
    }
}

/// Initialize logging from the environment (for tests and simple cases).
pub fn init_default_logging() -> bool {
    init_logging(&LogConfig::from_env(None, None))
}
