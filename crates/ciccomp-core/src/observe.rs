//! Structured logging via the `tracing` ecosystem.
//!
//! The engine emits `tracing` events from the exchange loop and the
//! eigenvalue refinement; this module gives hosting binaries and tests a
//! one-call subscriber setup with level filtering and an optional compact
//! format. Environment configuration through `RUST_LOG` takes precedence
//! over the programmatic level.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose; per-iteration candidate detail)
    Trace,
    /// Debug level (per-iteration summaries)
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warning level (fallback engagements, suspicious configurations)
    Warn,
    /// Error level (least verbose)
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// One event per line without the pretty-printed field layout.
    pub compact: bool,
    /// Include source location (file:line) in events.
    pub source_location: bool,
}

/// Initialize the global `tracing` subscriber. Safe to call more than once;
/// subsequent calls are ignored, which keeps parallel test binaries happy.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.source_location)
        .with_line_number(config.source_location);
    let result = if config.compact {
        builder.compact().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        tracing::debug!("logging already initialized, keeping existing subscriber");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig {
            level: LogLevel::Debug,
            compact: true,
            ..Default::default()
        };
        init_logging(&config);
        init_logging(&config);
        tracing::debug!("logging initialized twice without panicking");
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let json = serde_json::to_string(&LogLevel::Warn).unwrap();
        assert_eq!(json, "\"warn\"");
    }
}
