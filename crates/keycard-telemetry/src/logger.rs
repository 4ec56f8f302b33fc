//! Structured logger handle with persistent fields.
//!
//! A [`Logger`] carries an ordered list of key/value fields. Deriving a
//! logger with [`Logger::with_field`] never changes the original, so a
//! handle given to one request cannot observe fields added by another.
//!
//! Events are emitted inside a span built by [`Logger::span`]. The shared
//! field names (request id, environment, version, service) become span
//! fields of their own, so the JSON formatter writes them as keys under
//! `span`. Any other field is collected into one `extra` object.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::logging::fields;

/// Field names recorded as individual span fields.
const SPAN_FIELDS: [&str; 4] = [fields::REQUEST_ID, fields::ENV, fields::VERSION, fields::SERVICE];

/// Cheap-clone logger carrying structured fields.
///
/// # Example
///
/// ```rust
/// use keycard_telemetry::Logger;
///
/// let base = Logger::new().with_field("service", "keycard");
/// let request = base.with_field("request_id", "0192");
///
/// assert_eq!(request.field("request_id").and_then(|v| v.as_str()), Some("0192"));
/// assert!(base.field("request_id").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Logger {
    fields: Arc<[(String, Value)]>,
}

impl Logger {
    /// Creates a logger without fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a logger with one more field. The receiver is unchanged.
    #[must_use]
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        fields.extend(self.fields.iter().cloned());
        fields.push((key.into(), value.into()));
        Self {
            fields: fields.into(),
        }
    }

    /// Returns the most recent value stored under `key`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Iterates over fields in the order they were added.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a span carrying the logger fields.
    ///
    /// Events recorded inside it (`span.in_scope(|| tracing::info!(..))`)
    /// are written with the fields attached. The span is created at error
    /// level so the fields survive any level filter that lets the event
    /// through.
    pub fn span(&self) -> tracing::Span {
        let text = |key: &str| self.field(key).map(render);
        let request_id = text(fields::REQUEST_ID);
        let env = text(fields::ENV);
        let version = text(fields::VERSION);
        let service = text(fields::SERVICE);

        let extra: Map<String, Value> = self
            .fields
            .iter()
            .filter(|(key, _)| !SPAN_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let extra = (!extra.is_empty()).then(|| Value::Object(extra).to_string());

        tracing::error_span!(
            "logger",
            request_id = request_id.as_deref(),
            env = env.as_deref(),
            version = version.as_deref(),
            service = service.as_deref(),
            extra = extra.as_deref()
        )
    }

    /// Emits a debug event.
    pub fn debug(&self, message: &str) {
        self.span().in_scope(|| tracing::debug!("{message}"));
    }

    /// Emits an info event.
    pub fn info(&self, message: &str) {
        self.span().in_scope(|| tracing::info!("{message}"));
    }

    /// Emits a warn event.
    pub fn warn(&self, message: &str) {
        self.span().in_scope(|| tracing::warn!("{message}"));
    }

    /// Emits an error event.
    pub fn error(&self, message: &str) {
        self.span().in_scope(|| tracing::error!("{message}"));
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders fields as `key=value` pairs separated by spaces. String values
/// are written without quotes.
impl fmt::Display for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match value {
                Value::String(s) => write!(f, "{key}={s}")?,
                other => write!(f, "{key}={other}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl Capture {
        fn lines(&self) -> Vec<Value> {
            let buf = self.0.lock();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_with_field_is_persistent() {
        let base = Logger::new().with_field("env", "dev");
        let derived = base.with_field("user_id", 7);

        assert_eq!(base.len(), 1);
        assert_eq!(derived.len(), 2);
        assert_eq!(derived.field("user_id"), Some(&Value::from(7)));
        assert!(base.field("user_id").is_none());
    }

    #[test]
    fn test_latest_field_wins() {
        let logger = Logger::new()
            .with_field("stage", "start")
            .with_field("stage", "done");

        assert_eq!(logger.field("stage").and_then(Value::as_str), Some("done"));
        assert_eq!(logger.len(), 2);
    }

    #[test]
    fn test_display_renders_pairs() {
        let logger = Logger::new()
            .with_field("request_id", "abc")
            .with_field("status_code", 200)
            .with_field("cached", false);

        assert_eq!(logger.to_string(), "request_id=abc status_code=200 cached=false");
        assert_eq!(Logger::new().to_string(), "");
    }

    #[test]
    fn test_fields_iterates_in_order() {
        let logger = Logger::new().with_field("a", 1).with_field("b", 2);
        let keys: Vec<_> = logger.fields().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_json_output_has_field_keys() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_writer(capture.clone())
            .finish();

        let logger = Logger::new()
            .with_field("env", "dev")
            .with_field("request_id", "0192 a=b")
            .with_field("user_id", 7);
        tracing::subscriber::with_default(subscriber, || logger.info("charged card"));

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["message"], "charged card");
        assert_eq!(line["span"]["request_id"], "0192 a=b");
        assert_eq!(line["span"]["env"], "dev");
        assert!(line["span"].get("version").is_none());

        let extra: Value = serde_json::from_str(line["span"]["extra"].as_str().unwrap()).unwrap();
        assert_eq!(extra["user_id"], 7);
    }

    #[test]
    fn test_clone_shares_fields() {
        let logger = Logger::new().with_field("a", 1);
        let clone = logger.clone();
        assert!(Arc::ptr_eq(&logger.fields, &clone.fields));
    }
}
