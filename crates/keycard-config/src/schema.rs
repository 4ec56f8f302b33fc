//! Configuration sections.
//!
//! Every section rejects unknown keys and fills missing ones with defaults.

use serde::{Deserialize, Serialize};

/// HTTP server section.
///
/// # Example
///
/// ```
/// use keycard_config::ServerSection;
///
/// let server: ServerSection = toml::from_str("port = 4000").unwrap();
/// assert_eq!(server.http_addr(), "0.0.0.0:4000");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Interface to bind.
    pub host: String,

    /// Port to bind. `0` picks a free port.
    pub port: u16,

    /// Deployment environment name.
    pub env: String,

    /// Service version reported in logs and error events.
    pub version: String,

    /// Grace period for in-flight requests on shutdown.
    pub shutdown_timeout_secs: u64,

    /// Keep idle connections open between requests.
    pub keep_alive: bool,

    /// Paths served without a request log line.
    pub quiet_routes: Vec<String>,

    /// Honour an incoming `X-Request-ID` header.
    pub trust_request_id: bool,
}

impl ServerSection {
    /// Returns `host:port`, bracketing IPv6 hosts.
    #[must_use]
    pub fn http_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            env: "dev".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            shutdown_timeout_secs: 10,
            keep_alive: true,
            quiet_routes: vec!["/healthz".to_string()],
            trust_request_id: false,
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Output format: `json`, `pretty` or `compact`.
    pub format: String,

    /// Include source file and line.
    pub include_location: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            include_location: false,
        }
    }
}

/// Error-reporting hub section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HubSection {
    /// Report errors and panics. When off, events are dropped.
    pub enabled: bool,

    /// Environment attached to events. Falls back to `server.env`.
    pub environment: Option<String>,

    /// Release attached to events. Falls back to `server.version`.
    pub release: Option<String>,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            enabled: true,
            environment: None,
            release: None,
        }
    }
}

/// Database section.
///
/// No pool is opened while `url` is unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    /// Connection URL.
    pub url: Option<String>,

    /// Maximum open connections.
    pub max_connections: u32,

    /// Connections kept open while idle.
    pub min_connections: u32,

    /// Idle time before a pooled connection is closed.
    pub idle_timeout_secs: u64,

    /// Bound on opening and verifying a connection.
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 100,
            min_connections: 0,
            idle_timeout_secs: 30 * 60,
            connect_timeout_secs: 5,
        }
    }
}
