//! Server error types.

use std::time::Duration;

use thiserror::Error;

/// Failure of the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid address '{addr}': {source}")]
    InvalidAddress {
        /// The configured address
        addr: String,
        /// Parse failure
        #[source]
        source: std::net::AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        /// The address
        addr: String,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The listener failed while accepting connections.
    #[error("listener failed: {0}")]
    Listener(#[source] std::io::Error),

    /// OS signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    /// In-flight requests outlived the grace period.
    #[error("shutdown timed out after {timeout:?} with {active} connection(s) still open")]
    ShutdownTimeout {
        /// The grace period
        timeout: Duration,
        /// Connections still open when it elapsed
        active: usize,
    },

    /// The drain task ended without reporting.
    #[error("shutdown task ended without reporting an outcome")]
    ShutdownAborted,
}
