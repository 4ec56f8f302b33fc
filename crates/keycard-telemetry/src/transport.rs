//! Delivery of error events.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::hub::Event;

/// Delivers captured events somewhere.
///
/// Implementations must not block the caller for long; `send` is invoked
/// from request tasks.
pub trait Transport: Send + Sync + 'static {
    /// Hands one event to the transport.
    fn send(&self, event: Event);

    /// Waits up to `timeout` for queued events to be delivered.
    ///
    /// Returns false if events may still be pending.
    fn flush(&self, timeout: Duration) -> bool {
        let _ = timeout;
        true
    }
}

/// Writes each event as an error-level log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn send(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::error!(
                event_id = %event.event_id,
                event = %json,
                "error event captured"
            ),
            Err(e) => tracing::error!(
                event_id = %event.event_id,
                error = %e,
                "error event could not be serialized"
            ),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send(&self, _event: Event) {}
}

/// Keeps events in memory. Intended for tests.
///
/// Clones share the same buffer, so one clone can be handed to a hub and
/// the other inspected afterwards.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingTransport {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl fmt::Debug for RecordingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingTransport")
            .field("events", &self.len())
            .finish()
    }
}
