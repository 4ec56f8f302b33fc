//! Telemetry error types.

use thiserror::Error;

/// Errors raised while setting up logging or error reporting.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("logging already initialized")]
    AlreadyInitialized,

    /// The level or filter directive could not be parsed.
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// The rejected directive
        filter: String,
        /// Parser message
        reason: String,
    },

    /// The log format name is unknown.
    #[error("unknown log format: {0}")]
    UnknownFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TelemetryError::AlreadyInitialized.to_string(),
            "logging already initialized"
        );
        assert_eq!(
            TelemetryError::UnknownFormat("xml".to_string()).to_string(),
            "unknown log format: xml"
        );
    }
}
