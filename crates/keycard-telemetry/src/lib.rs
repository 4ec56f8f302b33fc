//! # Keycard Telemetry
//!
//! Logging and error reporting for the Keycard runtime.
//!
//! - [`init_logging`] installs the global `tracing` subscriber (JSON or
//!   human readable, filtered by `RUST_LOG` or the configured level)
//! - [`Logger`] is a structured logger handle with persistent fields,
//!   carried per request and augmented as the request progresses
//! - [`Hub`] captures errors and messages as [`Event`]s and hands them to a
//!   [`Transport`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use keycard_telemetry::{init_logging, Hub, HubOptions, LogConfig, LogTransport, Logger};
//!
//! init_logging(&LogConfig::development())?;
//!
//! let logger = Logger::new().with_field("env", "dev");
//! let hub = Hub::new(HubOptions::default().environment("dev"), Arc::new(LogTransport));
//! logger.info("starting server");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod hub;
pub mod logger;
pub mod logging;
pub mod transport;

pub use error::TelemetryError;
pub use hub::{Event, EventId, ExceptionInfo, Hub, HubOptions, Level};
pub use logger::Logger;
pub use logging::{fields, init_logging, LogConfig, LogFormat};
pub use transport::{LogTransport, NoopTransport, RecordingTransport, Transport};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
