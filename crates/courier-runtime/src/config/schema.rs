//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use courier_framework::{DEFAULT_MAX_HISTORY, DispatcherOptions};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
///
/// ```toml
/// [dispatcher]
/// max_history = 5000
/// error_summary_len = 200
///
/// [logging]
/// level = "debug"
/// format = "pretty"
///
/// [logging.filters]
/// courier_framework = "trace"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    /// Dispatch loop settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Dispatch loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of events kept in the history log.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Persist the session state when the loop exits.
    #[serde(default = "default_true")]
    pub persist_on_exit: bool,

    /// Characters of a handler error logged at warning level.
    #[serde(default = "default_error_summary_len")]
    pub error_summary_len: usize,

    /// Pause after a failed poll, in milliseconds.
    #[serde(default = "default_poll_retry_delay_ms")]
    pub poll_retry_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            persist_on_exit: true,
            error_summary_len: default_error_summary_len(),
            poll_retry_delay_ms: default_poll_retry_delay_ms(),
        }
    }
}

impl DispatcherConfig {
    /// Converts to dispatcher options.
    pub fn to_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            max_history: self.max_history,
            persist_on_exit: self.persist_on_exit,
            error_summary_len: self.error_summary_len,
            poll_retry_delay: Duration::from_millis(self.poll_retry_delay_ms),
        }
    }
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

fn default_true() -> bool {
    true
}

fn default_error_summary_len() -> usize {
    120
}

fn default_poll_retry_delay_ms() -> u64 {
    1000
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `Full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Writes to `file_path`.
    File,
}

/// When the log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module levels, e.g. `courier_framework = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_defaults_match_options() {
        let options = DispatcherConfig::default().to_options();
        assert_eq!(options, DispatcherOptions::default());
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::default().to_string(), "info");
    }
}
