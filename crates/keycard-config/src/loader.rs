//! Layered configuration loader.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{ConfigError, KeycardConfig};

/// Environment variable prefix read by [`ConfigLoader::with_env_prefix`] in
/// the `keycard` binary.
pub const ENV_PREFIX: &str = "KEYCARD";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables (`PREFIX__SECTION__KEY`)
///
/// # Example
///
/// ```no_run
/// use keycard_config::ConfigLoader;
///
/// # fn main() -> Result<(), keycard_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_optional_file("keycard.toml")?
///     .with_env_prefix("KEYCARD")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: KeycardConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = KeycardConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use keycard_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = KeycardConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = KeycardConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format follows the extension: `.toml` or `.json`. Keys missing
    /// from the file take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed
    /// or has unknown keys.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use keycard_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     port = 3000
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 3000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `KEYCARD__SERVER__PORT=4000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load `.env` from the working directory or its parents, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();
        self
    }

    /// Load a specific env file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or malformed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match dotenvy::from_path(path) {
            Ok(()) => Ok(self),
            Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConfigError::file_not_found(path))
            }
            Err(dotenvy::Error::Io(e)) => Err(ConfigError::read_error(path, e)),
            Err(e) => Err(ConfigError::validation_error(format!(
                "invalid env file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or validation
    /// fails.
    pub fn load(mut self) -> Result<KeycardConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env(&prefix, env::vars())?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> KeycardConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<KeycardConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let section_prefix = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(path) = key.strip_prefix(&section_prefix) {
                self.apply_env_var(&key, path, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, path: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HOST"] => config.server.host = value.to_string(),
            ["SERVER", "PORT"] => config.server.port = parse(key, value, "expected port number")?,
            ["SERVER", "ENV"] => config.server.env = value.to_string(),
            ["SERVER", "VERSION"] => config.server.version = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse(key, value, "expected integer")?;
            }
            ["SERVER", "KEEP_ALIVE"] => config.server.keep_alive = parse_bool(key, value)?,
            ["SERVER", "QUIET_ROUTES"] => config.server.quiet_routes = parse_list(value),
            ["SERVER", "TRUST_REQUEST_ID"] => {
                config.server.trust_request_id = parse_bool(key, value)?;
            }

            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => config.logging.format = value.to_lowercase(),
            ["LOGGING", "INCLUDE_LOCATION"] => {
                config.logging.include_location = parse_bool(key, value)?;
            }

            ["HUB", "ENABLED"] => config.hub.enabled = parse_bool(key, value)?,
            ["HUB", "ENVIRONMENT"] => config.hub.environment = non_empty(value),
            ["HUB", "RELEASE"] => config.hub.release = non_empty(value),

            ["DATABASE", "URL"] => config.database.url = non_empty(value),
            ["DATABASE", "MAX_CONNECTIONS"] => {
                config.database.max_connections = parse(key, value, "expected integer")?;
            }
            ["DATABASE", "MIN_CONNECTIONS"] => {
                config.database.min_connections = parse(key, value, "expected integer")?;
            }
            ["DATABASE", "IDLE_TIMEOUT_SECS"] => {
                config.database.idle_timeout_secs = parse(key, value, "expected integer")?;
            }
            ["DATABASE", "CONNECT_TIMEOUT_SECS"] => {
                config.database.connect_timeout_secs = parse(key, value, "expected integer")?;
            }

            // Other tools may share the prefix.
            _ => {}
        }

        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, expected))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, KeycardConfig::default());
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.server.env, "production");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"server": {"port": 3000}, "database": {"url": "postgres://db/keycard"}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.url.as_deref(), Some("postgres://db/keycard"));
    }

    #[test]
    fn test_loader_rejects_unknown_format() {
        let result = ConfigLoader::new().with_string("port: 1", "yaml");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_section() {
        let result = ConfigLoader::new().with_string("[metrics]\nenabled = true", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/keycard.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/keycard.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env(
                "KEYCARD",
                vars(&[
                    ("KEYCARD__SERVER__PORT", "4000"),
                    ("KEYCARD__SERVER__QUIET_ROUTES", "/healthz, /metrics"),
                    ("KEYCARD__LOGGING__FORMAT", "Pretty"),
                    ("KEYCARD__HUB__ENABLED", "off"),
                    ("KEYCARD__DATABASE__URL", "postgres://db/keycard"),
                    ("KEYCARD__DATABASE__MAX_CONNECTIONS", "20"),
                    ("OTHER__SERVER__PORT", "1"),
                    ("KEYCARDX__SERVER__PORT", "2"),
                ]),
            )
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.quiet_routes, vec!["/healthz", "/metrics"]);
        assert_eq!(config.logging.format, "pretty");
        assert!(!config.hub.enabled);
        assert_eq!(config.database.url.as_deref(), Some("postgres://db/keycard"));
        assert_eq!(config.database.max_connections, 20);
    }

    #[test]
    fn test_env_override_invalid_integer() {
        let mut loader = ConfigLoader::new();
        let err = loader
            .apply_env("KEYCARD", vars(&[("KEYCARD__SERVER__PORT", "eighty")]))
            .unwrap_err();
        match err {
            ConfigError::EnvParseError { var, .. } => assert_eq!(var, "KEYCARD__SERVER__PORT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_override_invalid_bool() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env("KEYCARD", vars(&[("KEYCARD__SERVER__KEEP_ALIVE", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_url_clears_database() {
        let mut loader = ConfigLoader::new()
            .with_string("[database]\nurl = \"postgres://db/keycard\"", "toml")
            .unwrap();
        loader
            .apply_env("KEYCARD", vars(&[("KEYCARD__DATABASE__URL", "")]))
            .unwrap();
        assert!(loader.load_unvalidated().database.url.is_none());
    }

    #[test]
    fn test_dotenv_file_missing() {
        let result = ConfigLoader::new().with_dotenv_file("/nonexistent/.env");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
