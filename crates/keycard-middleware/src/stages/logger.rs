//! Request logging middleware.
//!
//! Binds a copy of the base logger to each request and, once the response
//! is ready, writes one `request` line carrying the accumulated logger
//! fields together with timing and size information.
//!
//! A panic below this stage is logged as a 500 before it continues to
//! unwind towards recovery.
//!
//! Paths registered as quiet (health probes, typically) still get a logger
//! but produce no request line.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use http::StatusCode;
use http_body::Body;
use keycard_core::{handler_fn, Handler, Middleware};
use keycard_telemetry::Logger;

/// Middleware that attaches the request logger and logs completed requests.
#[derive(Debug, Clone)]
pub struct LoggerMiddleware {
    logger: Logger,
    quiet_routes: Arc<[String]>,
}

impl LoggerMiddleware {
    /// Creates the stage with `logger` as the base for every request logger.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            quiet_routes: Arc::new([]),
        }
    }

    /// Sets the paths that are never logged. Matching is exact.
    #[must_use]
    pub fn with_quiet_routes(mut self, routes: Vec<String>) -> Self {
        self.quiet_routes = routes.into();
        self
    }

    /// Whether `path` is excluded from request logging.
    #[must_use]
    pub fn is_quiet(&self, path: &str) -> bool {
        is_quiet(&self.quiet_routes, path)
    }
}

fn is_quiet(routes: &[String], path: &str) -> bool {
    routes.iter().any(|route| route == path)
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let base = self.logger.clone();
        let quiet_routes = Arc::clone(&self.quiet_routes);

        handler_fn(move |ctx, req| {
            let next = next.clone();
            let logger = base.clone();
            let quiet = is_quiet(&quiet_routes, req.uri().path());
            Box::pin(async move {
                ctx.attach_logger(logger);
                if quiet {
                    return next(ctx, req).await;
                }

                let method = req.method().clone();
                let uri = req.uri().clone();
                let user_agent = req
                    .headers()
                    .get(http::header::USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let request_size = req.body().size_hint().exact().unwrap_or_default();

                let outcome = AssertUnwindSafe(next(ctx, req)).catch_unwind().await;

                let (status, response_size) = match &outcome {
                    Ok(response) => (
                        response.status(),
                        response.body().size_hint().exact().unwrap_or_default(),
                    ),
                    Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, 0),
                };
                let requester_ip = ctx
                    .client_ip()
                    .map(|ip| ip.to_string())
                    .unwrap_or_default();

                ctx.logger().span().in_scope(|| {
                    tracing::info!(
                        duration_ms = ctx.elapsed().as_millis() as u64,
                        uri = %uri,
                        method = %method,
                        status_code = status.as_u16(),
                        requester_ip = %requester_ip,
                        user_agent = %user_agent,
                        request_size,
                        response_size,
                        "request"
                    );
                });

                match outcome {
                    Ok(response) => response,
                    Err(payload) => panic::resume_unwind(payload),
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use keycard_core::{empty_response, Request, RequestContext};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::io;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
            tracing_subscriber::fmt()
                .json()
                .flatten_event(true)
                .with_writer(self.clone())
                .finish()
        }

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

    fn request(path: &str) -> Request {
        let mut request = Request::new(Full::new(Bytes::from_static(b"{}")));
        *request.uri_mut() = path.parse().unwrap();
        request
    }

    fn echo_field() -> Handler {
        handler_fn(|ctx, _req| {
            Box::pin(async move {
                assert_eq!(
                    ctx.logger().field("service").and_then(|v| v.as_str()),
                    Some("catalog")
                );
                ctx.augment_logger("user_id", 7);
                empty_response(StatusCode::OK)
            })
        })
    }

    #[tokio::test]
    async fn test_attaches_base_logger() {
        let stage = LoggerMiddleware::new(Logger::new().with_field("service", "catalog"));
        let handler = stage.wrap(echo_field());

        let mut ctx = RequestContext::new();
        let response = handler(&mut ctx, request("/items/1")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(ctx.logger().field("user_id"), Some(&7.into()));
    }

    #[tokio::test]
    async fn test_each_request_starts_from_base() {
        let base = Logger::new().with_field("service", "catalog");
        let handler = LoggerMiddleware::new(base.clone()).wrap(echo_field());

        let mut first = RequestContext::new();
        handler(&mut first, request("/a")).await;
        let mut second = RequestContext::new();
        handler(&mut second, request("/b")).await;

        assert_eq!(base.field("user_id"), None);
        assert_eq!(second.logger().len(), 2);
    }

    #[tokio::test]
    async fn test_quiet_route_still_gets_logger() {
        let stage = LoggerMiddleware::new(Logger::new().with_field("service", "catalog"))
            .with_quiet_routes(vec!["/healthz".to_string()]);
        let handler = stage.wrap(echo_field());

        let mut ctx = RequestContext::new();
        let response = handler(&mut ctx, request("/healthz")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    fn explode() -> Handler {
        handler_fn(|ctx, _req| {
            Box::pin(async move {
                ctx.augment_logger("request_id", "r-9");
                fail()
            })
        })
    }

    fn fail() -> keycard_core::Response {
        panic!("ledger unavailable")
    }

    #[tokio::test]
    async fn test_request_line_is_structured() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let handler = LoggerMiddleware::new(Logger::new().with_field("service", "catalog"))
            .wrap(echo_field());
        let mut ctx = RequestContext::new();
        handler(&mut ctx, request("/items/1")).await;

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "request");
        assert_eq!(lines[0]["status_code"], 200);
        assert_eq!(lines[0]["request_size"], 2);
        assert_eq!(lines[0]["span"]["service"], "catalog");
    }

    #[tokio::test]
    async fn test_panicking_request_is_logged() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let handler = LoggerMiddleware::new(Logger::new()).wrap(explode());
        let mut ctx = RequestContext::new();
        let outcome = AssertUnwindSafe(handler(&mut ctx, request("/items/1")))
            .catch_unwind()
            .await;
        assert!(outcome.is_err(), "the panic should keep unwinding");

        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["message"], "request");
        assert_eq!(lines[0]["status_code"], 500);
        assert_eq!(lines[0]["uri"], "/items/1");
        assert_eq!(lines[0]["span"]["request_id"], "r-9");
    }

    #[tokio::test]
    async fn test_quiet_route_writes_no_line() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let handler = LoggerMiddleware::new(Logger::new().with_field("service", "catalog"))
            .with_quiet_routes(vec!["/healthz".to_string()])
            .wrap(echo_field());
        let mut ctx = RequestContext::new();
        handler(&mut ctx, request("/healthz")).await;

        assert!(capture.lines().is_empty());
    }

    #[test]
    fn test_quiet_matching_is_exact() {
        let stage = LoggerMiddleware::new(Logger::new())
            .with_quiet_routes(vec!["/healthz".to_string()]);
        assert!(stage.is_quiet("/healthz"));
        assert!(!stage.is_quiet("/healthz/deep"));
        assert!(!stage.is_quiet("/items"));
        assert_eq!(stage.name(), "logger");
    }
}
