//! Panic recovery.
//!
//! Outermost stage. Gives each request its own hub, then runs the rest of
//! the chain under `catch_unwind`. A panic anywhere below is logged with
//! the request id, captured on the hub as an exception, and turned into a
//! bodiless 500 with `Connection: close`: a partial response may already
//! be on the wire, so the connection is not reused.
//!
//! Only panics are handled here. Ordinary failures are expected to come
//! back as responses from the handlers themselves.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use http::header::{HeaderValue, CONNECTION};
use http::StatusCode;
use keycard_core::{empty_response, handler_fn, Handler, Middleware, RequestContext, Response};
use keycard_telemetry::{Hub, Logger};

use super::request_id::REQUEST_ID_HEADER;

/// Error reported for a panic whose payload is not itself an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicError {
    message: String,
}

impl PanicError {
    /// Creates a panic error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

impl StdError for PanicError {}

/// The recovered panic payload, classified.
enum Recovered {
    /// The payload was raised with `std::panic::panic_any` and is an error.
    Error(Box<dyn StdError + Send + Sync>),
    /// Anything else, wrapped.
    Other(PanicError),
}

impl Recovered {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Box<dyn StdError + Send + Sync>>() {
            Ok(err) => return Self::Error(*err),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<&'static str>() {
            Ok(msg) => return Self::Other(PanicError::new(*msg)),
            Err(payload) => payload,
        };
        match payload.downcast::<String>() {
            Ok(msg) => Self::Other(PanicError::new(*msg)),
            Err(_) => Self::Other(PanicError::new("non-string panic payload")),
        }
    }

    fn as_error(&self) -> &(dyn StdError + 'static) {
        match self {
            Self::Error(err) => err.as_ref(),
            Self::Other(err) => err,
        }
    }
}

/// Catches panics from the wrapped chain.
#[derive(Debug, Clone)]
pub struct RecoveryMiddleware {
    hub: Hub,
    fallback_logger: Logger,
}

impl RecoveryMiddleware {
    /// Creates the stage.
    ///
    /// `hub` is the process template; every request receives its own clone.
    /// `fallback_logger` is used when the panic happened before a request
    /// logger was attached.
    #[must_use]
    pub fn new(hub: Hub, fallback_logger: Logger) -> Self {
        Self {
            hub,
            fallback_logger,
        }
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let template = self.hub.clone();
        let fallback = self.fallback_logger.clone();

        handler_fn(move |ctx, req| {
            let next = next.clone();
            let hub = template.clone_for_request();
            let fallback = fallback.clone();
            Box::pin(async move {
                ctx.attach_hub(hub);
                let outcome = AssertUnwindSafe(next(ctx, req)).catch_unwind().await;
                match outcome {
                    Ok(response) => response,
                    Err(payload) => recover(ctx, &fallback, payload),
                }
            })
        })
    }
}

fn recover(ctx: &RequestContext, fallback: &Logger, payload: Box<dyn Any + Send>) -> Response {
    let recovered = Recovered::from_payload(payload);
    let err = recovered.as_error();

    let logger = ctx.try_logger().unwrap_or(fallback);
    let request_id = ctx
        .request_id()
        .map_or_else(|| "unknown".to_string(), |id| id.to_string());
    logger.span().in_scope(|| {
        tracing::error!(request_id = %request_id, error = %err, "panic encountered");
    });

    if let Some(hub) = ctx.try_hub() {
        match &recovered {
            Recovered::Error(err) => hub.capture_error(err.as_ref()),
            Recovered::Other(err) => hub.capture_error(err),
        };
    }

    let mut response = empty_response(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    // The request id stage unwound before it could set the header.
    if let Some(value) = ctx
        .request_id()
        .and_then(|id| HeaderValue::from_str(&id.to_string()).ok())
    {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use keycard_core::Request;
    use keycard_telemetry::{HubOptions, RecordingTransport};
    use std::sync::Arc;

    #[derive(Debug)]
    struct StoreDown;

    impl fmt::Display for StoreDown {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("store unavailable")
        }
    }

    impl StdError for StoreDown {}

    fn request() -> Request {
        Request::new(Full::new(Bytes::new()))
    }

    fn boom() -> Response {
        panic!("boom: {}", 42)
    }

    fn fail_with_error() -> Response {
        let err: Box<dyn StdError + Send + Sync> = Box::new(StoreDown);
        std::panic::panic_any(err)
    }

    fn recording_stage() -> (RecoveryMiddleware, RecordingTransport) {
        let recorder = RecordingTransport::new();
        let hub = Hub::new(HubOptions::default(), Arc::new(recorder.clone()));
        (RecoveryMiddleware::new(hub, Logger::new()), recorder)
    }

    #[tokio::test]
    async fn test_passes_through_without_panic() {
        let (stage, recorder) = recording_stage();
        let handler = stage.wrap(handler_fn(|ctx, _req| {
            Box::pin(async move {
                assert!(ctx.try_hub().is_some());
                empty_response(StatusCode::NO_CONTENT)
            })
        }));

        let mut ctx = RequestContext::new();
        let response = handler(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONNECTION).is_none());
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_string_panic_becomes_500() {
        let (stage, recorder) = recording_stage();
        let handler = stage.wrap(handler_fn(|_ctx, _req| Box::pin(async move { boom() })));

        let mut ctx = RequestContext::new();
        let response = handler(&mut ctx, request()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");
        assert!(response.headers().get(REQUEST_ID_HEADER).is_none());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        let exception = events[0].exception.as_ref().unwrap();
        assert_eq!(exception.ty, "PanicError");
        assert_eq!(exception.value, "panic: boom: 42");
    }

    #[tokio::test]
    async fn test_error_payload_is_reported_directly() {
        let (stage, recorder) = recording_stage();
        let handler = stage.wrap(handler_fn(|_ctx, _req| {
            Box::pin(async move { fail_with_error() })
        }));

        let mut ctx = RequestContext::new();
        let response = handler(&mut ctx, request()).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let events = recorder.events();
        assert_eq!(events[0].exception.as_ref().unwrap().value, "store unavailable");
    }

    #[tokio::test]
    async fn test_event_carries_request_tags() {
        let (stage, recorder) = recording_stage();
        let handler = stage.wrap(handler_fn(|ctx, _req| {
            Box::pin(async move {
                ctx.hub_mut().set_tag("request_id", "r-1");
                boom()
            })
        }));

        let mut ctx = RequestContext::new();
        handler(&mut ctx, request()).await;

        assert_eq!(recorder.events()[0].tags["request_id"], "r-1");
    }

    #[test]
    fn test_non_string_payload() {
        let recovered = Recovered::from_payload(Box::new(17_u32));
        assert_eq!(recovered.as_error().to_string(), "panic: non-string panic payload");
    }
}
