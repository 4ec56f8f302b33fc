//! Global log subscriber setup.
//!
//! # Example
//!
//! ```rust,ignore
//! use keycard_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! tracing::info!(addr = "0.0.0.0:8080", "starting server");
//! ```

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    Compact,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            _ => Err(TelemetryError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        })
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info" or
    /// "keycard=debug,sqlx=warn")
    pub level: String,

    /// Output format
    pub format: LogFormat,

    /// Whether to include the event target (module path)
    pub include_target: bool,

    /// Whether to include file and line
    pub include_location: bool,

    /// Whether to include thread ids
    pub include_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Human readable output at debug level.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Builds the filter: `RUST_LOG` when set, otherwise `level`.
    pub fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| TelemetryError::InvalidFilter {
            filter: self.level.clone(),
            reason: e.to_string(),
        })
    }
}

/// Installs the global subscriber.
///
/// Returns [`TelemetryError::AlreadyInitialized`] if a global subscriber
/// already exists, so tests may call it more than once.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.env_filter()?;

    let layer = tracing_subscriber::fmt::layer()
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_ids);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Standard field names shared by every log line.
pub mod fields {
    /// Request identifier.
    pub const REQUEST_ID: &str = "request_id";
    /// Deployment environment.
    pub const ENV: &str = "env";
    /// Service version.
    pub const VERSION: &str = "version";
    /// Service name.
    pub const SERVICE: &str = "service";
    /// HTTP method.
    pub const METHOD: &str = "method";
    /// Request URI.
    pub const URI: &str = "uri";
    /// Response status code.
    pub const STATUS_CODE: &str = "status_code";
    /// Handling time in milliseconds.
    pub const DURATION_MS: &str = "duration_ms";
    /// Resolved client address.
    pub const REQUESTER_IP: &str = "requester_ip";
    /// `User-Agent` header.
    pub const USER_AGENT: &str = "user_agent";
    /// Request body size in bytes.
    pub const REQUEST_SIZE: &str = "request_size";
    /// Response body size in bytes.
    pub const RESPONSE_SIZE: &str = "response_size";
    /// Error text.
    pub const ERROR: &str = "error";
}
