//! Error-reporting hub.
//!
//! One template [`Hub`] is built at startup. Each request receives its own
//! copy through [`Hub::clone_for_request`]; the copy shares the transport
//! but owns its tag scope, so tags set while handling one request are never
//! seen by another.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use keycard_telemetry::{Hub, HubOptions, RecordingTransport};
//!
//! let recorder = RecordingTransport::new();
//! let template = Hub::new(HubOptions::default(), Arc::new(recorder.clone()));
//!
//! let mut hub = template.clone_for_request();
//! hub.set_tag("request_id", "0192");
//! let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
//! hub.capture_error(&err);
//!
//! let events = recorder.events();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].tags.get("request_id").map(String::as_str), Some("0192"));
//! assert!(template.tags().is_empty());
//! ```

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transport::{NoopTransport, Transport};

/// Identifier of a captured event.
pub type EventId = Uuid;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Diagnostic detail
    Debug,
    /// Informational message
    Info,
    /// Something unexpected that was handled
    Warning,
    /// A failure
    Error,
    /// A failure that takes the process down
    Fatal,
}

/// Exception payload of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Short type name of the error
    #[serde(rename = "type")]
    pub ty: String,
    /// `Display` text of the error
    pub value: String,
    /// `Display` text of each `source()` in order
    pub chain: Vec<String>,
}

/// A captured event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id (UUID v7, so ids sort by capture time)
    pub event_id: EventId,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: Level,
    /// Human readable summary
    pub message: String,
    /// Present for captured errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
    /// Tags of the hub at capture time
    pub tags: BTreeMap<String, String>,
    /// Deployment environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Release or version string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Host name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

/// Options stamped on every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubOptions {
    /// Deployment environment (e.g. "dev", "production")
    pub environment: Option<String>,
    /// Release or version string
    pub release: Option<String>,
    /// Host name
    pub server_name: Option<String>,
}

impl HubOptions {
    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the release.
    #[must_use]
    pub fn release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    /// Sets the server name.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

struct Client {
    options: HubOptions,
    transport: Arc<dyn Transport>,
}

/// Error-reporting handle with a private tag scope.
#[derive(Clone)]
pub struct Hub {
    client: Arc<Client>,
    tags: BTreeMap<String, String>,
}

impl Hub {
    /// Creates a template hub.
    #[must_use]
    pub fn new(options: HubOptions, transport: Arc<dyn Transport>) -> Self {
        Self {
            client: Arc::new(Client { options, transport }),
            tags: BTreeMap::new(),
        }
    }

    /// Creates a hub that drops every event.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(HubOptions::default(), Arc::new(NoopTransport))
    }

    /// Returns a copy for one request.
    ///
    /// The copy starts with this hub's tags. Tags set on either side later
    /// stay private to that side.
    #[must_use]
    pub fn clone_for_request(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            tags: self.tags.clone(),
        }
    }

    /// Sets a tag on this hub's scope.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Returns the tags of this hub's scope.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Returns the options stamped on events.
    #[must_use]
    pub fn options(&self) -> &HubOptions {
        &self.client.options
    }

    /// Captures an error as an exception event.
    pub fn capture_error<E>(&self, error: &E) -> EventId
    where
        E: StdError + ?Sized,
    {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        let exception = ExceptionInfo {
            ty: short_type_name::<E>().to_string(),
            value: error.to_string(),
            chain,
        };
        self.send(Level::Error, error.to_string(), Some(exception))
    }

    /// Captures a plain message.
    pub fn capture_message(&self, message: &str, level: Level) -> EventId {
        self.send(level, message.to_string(), None)
    }

    /// Waits up to `timeout` for the transport to deliver pending events.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.client.transport.flush(timeout)
    }

    fn send(&self, level: Level, message: String, exception: Option<ExceptionInfo>) -> EventId {
        let options = &self.client.options;
        let event = Event {
            event_id: Uuid::now_v7(),
            timestamp: Utc::now(),
            level,
            message,
            exception,
            tags: self.tags.clone(),
            environment: options.environment.clone(),
            release: options.release.clone(),
            server_name: options.server_name.clone(),
        };
        let id = event.event_id;
        self.client.transport.send(event);
        id
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("options", &self.client.options)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Last path segment of a type name, generics stripped. Trait objects
/// report as `Error`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    if full.starts_with("dyn ") {
        return "Error";
    }
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
