//! Root configuration type.

use std::str::FromStr;

use keycard_telemetry::{HubOptions, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, DatabaseSection, HubSection, LoggingSection, ServerSection};

/// Complete Keycard service configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use keycard_config::KeycardConfig;
///
/// let config = KeycardConfig::default();
/// assert_eq!(config.server.http_addr(), "0.0.0.0:8080");
/// assert!(config.database.url.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct KeycardConfig {
    /// HTTP server section.
    pub server: ServerSection,

    /// Logging section.
    pub logging: LoggingSection,

    /// Error-reporting hub section.
    pub hub: HubSection,

    /// Database section.
    pub database: DatabaseSection,
}

impl KeycardConfig {
    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }

        if self.server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.shutdown_timeout_secs",
                "must be greater than zero",
            ));
        }

        if let Some(route) = self.server.quiet_routes.iter().find(|r| !r.starts_with('/')) {
            return Err(ConfigError::invalid_value(
                "server.quiet_routes",
                format!("path must start with '/': {route}"),
            ));
        }

        if LogFormat::from_str(&self.logging.format).is_err() {
            return Err(ConfigError::invalid_value(
                "logging.format",
                format!(
                    "expected 'json', 'pretty' or 'compact', got '{}'",
                    self.logging.format
                ),
            ));
        }

        if self.database.url.is_some() {
            if self.database.max_connections == 0 {
                return Err(ConfigError::invalid_value(
                    "database.max_connections",
                    "must be greater than zero",
                ));
            }
            if self.database.min_connections > self.database.max_connections {
                return Err(ConfigError::validation_error(
                    "database.min_connections must not exceed database.max_connections",
                ));
            }
        }

        Ok(())
    }

    /// Development preset: pretty debug logs.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = "pretty".to_string();
        config.logging.include_location = true;
        config
    }

    /// Production preset: JSON info logs.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.server.env = "production".to_string();
        config.logging.level = "info".to_string();
        config.logging.format = "json".to_string();
        config
    }

    /// Returns the subscriber settings for this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an unknown log format.
    pub fn log_config(&self) -> Result<LogConfig, ConfigError> {
        let format = LogFormat::from_str(&self.logging.format)
            .map_err(|e| ConfigError::invalid_value("logging.format", e.to_string()))?;

        let mut log = LogConfig::default()
            .with_level(self.logging.level.clone())
            .with_format(format);
        log.include_location = self.logging.include_location;
        Ok(log)
    }

    /// Returns the hub options, falling back to the server's environment and
    /// version.
    #[must_use]
    pub fn hub_options(&self) -> HubOptions {
        let environment = self
            .hub
            .environment
            .clone()
            .unwrap_or_else(|| self.server.env.clone());
        let release = self
            .hub
            .release
            .clone()
            .unwrap_or_else(|| self.server.version.clone());

        HubOptions::default().environment(environment).release(release)
    }
}
