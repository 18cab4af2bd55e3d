//! Core error types for redialer-core.
//!
//! None of these are fatal: after any handled error the automaton is left
//! in a well-defined state.

use std::path::PathBuf;
use thiserror::Error;

/// Lifecycle errors returned by [`Monitor`](crate::monitor::Monitor) and
/// [`MonitorHandle`](crate::monitor::MonitorHandle).
///
/// Config problems surface earlier as [`ConfigError`]; sink failures never
/// reach the caller and are published as events instead.
#[derive(Error, Debug)]
pub enum CoreError {
    /// `start` called while a monitor is already running
    #[error("Monitor is already running")]
    AlreadyRunning,

    /// The monitor is stopped; the call was discarded
    #[error("Monitor is not running")]
    NotRunning,

    /// `start` called before `configure`
    #[error("Monitor has not been configured")]
    NotConfigured,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// No usable configuration directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Errors reported by a [`CommandSink`](crate::sink::CommandSink).
#[derive(Error, Debug)]
pub enum SinkError {
    /// The platform refused the command (e.g. dial rejected)
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// No backend is available for this command
    #[error("Command unavailable: {0}")]
    Unavailable(String),

    /// Spawning or talking to the backend failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_display() {
        assert_eq!(CoreError::AlreadyRunning.to_string(), "Monitor is already running");
        assert_eq!(CoreError::NotRunning.to_string(), "Monitor is not running");
        assert_eq!(CoreError::NotConfigured.to_string(), "Monitor has not been configured");
    }

    #[test]
    fn spawn_failure_is_a_sink_error() {
        let err: SinkError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, SinkError::Io(_)));
    }
}
