//! Typed configuration for Keycard services.
//!
//! Configuration is layered: built-in defaults, then an optional TOML or
//! JSON file, then environment variables. Every section rejects unknown keys.
//!
//! # Example
//!
//! ```no_run
//! use keycard_config::{ConfigLoader, ENV_PREFIX};
//!
//! # fn main() -> Result<(), keycard_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("keycard.toml")?
//!     .with_env_prefix(ENV_PREFIX)
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! env = "production"
//! shutdown_timeout_secs = 10
//! quiet_routes = ["/healthz"]
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [hub]
//! enabled = true
//!
//! [database]
//! url = "postgres://keycard@localhost/keycard"
//! max_connections = 100
//! ```
//!
//! # Environment Variable Overrides
//!
//! Any value can be overridden with `KEYCARD__SECTION__KEY`:
//!
//! - `KEYCARD__SERVER__PORT=4000`
//! - `KEYCARD__LOGGING__FORMAT=pretty`
//! - `KEYCARD__DATABASE__URL=postgres://...`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::KeycardConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use schema::{DatabaseSection, HubSection, LoggingSection, ServerSection};
