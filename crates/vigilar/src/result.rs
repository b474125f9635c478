//! Result and error types for Vigilar.

use thiserror::Error;

/// Result type for Vigilar operations
pub type VigilarResult<T> = Result<T, VigilarError>;

/// Errors that can occur in Vigilar
#[derive(Debug, Error)]
pub enum VigilarError {
    /// Configuration rejected at initialization (fail-fast, agent does not start)
    #[error("Invalid configuration value for '{field}': {message}")]
    Config {
        /// Configuration field that failed validation
        field: &'static str,
        /// Error message
        message: String,
    },

    /// Selector string could not be parsed
    #[error("Invalid selector '{selector}': {message}")]
    Selector {
        /// The offending selector
        selector: String,
        /// Error message
        message: String,
    },

    /// Collector delivery failed (logged by callers, never retried)
    #[error("Collector delivery failed: {message}")]
    Collector {
        /// Error message
        message: String,
    },

    /// Persisted assertion state could not be read or written
    #[error("Storage error: {message}")]
    Storage {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
