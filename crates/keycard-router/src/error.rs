//! Route registration errors.

use http::Method;
use thiserror::Error;

/// Errors raised while registering a route.
///
/// Lookups never fail; only building the table can.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The same method and pattern were registered twice.
    #[error("route already registered: {method} {pattern}")]
    Duplicate {
        /// Method of the conflicting registration
        method: Method,
        /// Pattern of the conflicting registration
        pattern: String,
    },

    /// The pattern could not be parsed.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// What is wrong with it
        reason: String,
    },
}

impl RouteError {
    pub(crate) fn invalid(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}
