//! Middleware composition.
//!
//! [`chain`] folds an ordered middleware list around a terminal handler.
//! The first middleware in the list ends up outermost: its "before" logic
//! runs first and its "after" logic runs last.
//!
//! [`Pipeline`] builds the fixed request lifecycle stack that every
//! application request passes through:
//!
//! 1. **Recovery** - catches panics, reports them, answers 500
//! 2. **Logger** - attaches the request logger and writes the request line
//! 3. **Request ID** - assigns the id, tags logger and hub, echoes the header
//! 4. **Real IP** - resolves the client address from proxy headers
//!
//! Application middleware and routing run inside this stack.

use std::sync::Arc;

use keycard_core::{Handler, SharedMiddleware};
use keycard_telemetry::{Hub, Logger};

use crate::stages::logger::LoggerMiddleware;
use crate::stages::real_ip::RealIpMiddleware;
use crate::stages::recovery::RecoveryMiddleware;
use crate::stages::request_id::RequestIdMiddleware;

/// Composes `middleware` around `terminal`.
///
/// `chain(h, &[a, b])` behaves like `a(b(h))`. An empty list returns
/// `terminal` itself. Nothing runs at composition time apart from each
/// middleware's `wrap`.
pub fn chain(terminal: Handler, middleware: &[SharedMiddleware]) -> Handler {
    middleware
        .iter()
        .rev()
        .fold(terminal, |next, mw| mw.wrap(next))
}

/// The fixed lifecycle stack.
///
/// # Example
///
/// ```ignore
/// use keycard_middleware::Pipeline;
///
/// let handler = Pipeline::builder()
///     .logger(logger)
///     .hub(hub)
///     .quiet_route("/healthz")
///     .build()
///     .wrap(router.into_handler());
/// ```
pub struct Pipeline {
    stages: Vec<SharedMiddleware>,
}

impl Pipeline {
    /// Creates a pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Wraps `handler` in every stage.
    pub fn wrap(&self, handler: Handler) -> Handler {
        chain(handler, &self.stages)
    }

    /// Returns the stage names from outermost to innermost.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|mw| mw.name()).collect()
    }
}

/// Builder for [`Pipeline`]. Only the stage configuration can change, never
/// the order.
#[derive(Default)]
pub struct PipelineBuilder {
    logger: Option<Logger>,
    hub: Option<Hub>,
    quiet_routes: Vec<String>,
    trust_request_id: bool,
    trust_forwarded: bool,
}

impl PipelineBuilder {
    /// Creates a builder with a field-less logger and a no-op hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trust_forwarded: true,
            ..Self::default()
        }
    }

    /// Sets the base logger every request logger derives from.
    #[must_use]
    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Sets the template hub cloned for each request.
    #[must_use]
    pub fn hub(mut self, hub: Hub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Excludes a path from request logging.
    #[must_use]
    pub fn quiet_route(mut self, path: impl Into<String>) -> Self {
        self.quiet_routes.push(path.into());
        self
    }

    /// Honours an incoming `X-Request-ID`.
    #[must_use]
    pub fn trust_request_id(mut self, trust: bool) -> Self {
        self.trust_request_id = trust;
        self
    }

    /// Honours `X-Forwarded-For` / `X-Real-IP`.
    #[must_use]
    pub fn trust_forwarded(mut self, trust: bool) -> Self {
        self.trust_forwarded = trust;
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let logger = self.logger.unwrap_or_default();
        let hub = self.hub.unwrap_or_else(Hub::noop);

        let request_id = if self.trust_request_id {
            RequestIdMiddleware::trust_incoming()
        } else {
            RequestIdMiddleware::new()
        };
        let real_ip = if self.trust_forwarded {
            RealIpMiddleware::new()
        } else {
            RealIpMiddleware::peer_only()
        };

        let stages: Vec<SharedMiddleware> = vec![
            Arc::new(RecoveryMiddleware::new(hub, logger.clone())),
            Arc::new(LoggerMiddleware::new(logger).with_quiet_routes(self.quiet_routes)),
            Arc::new(request_id),
            Arc::new(real_ip),
        ];
        Pipeline { stages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use keycard_core::{handler_fn, middleware_fn, Request, RequestContext, Response};
    use parking_lot::Mutex;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn recording(name: &'static str, trace: &Trace) -> SharedMiddleware {
        let trace = Arc::clone(trace);
        middleware_fn(name, move |next: Handler| {
            let trace = Arc::clone(&trace);
            handler_fn(move |ctx, req| {
                let next = next.clone();
                let trace = Arc::clone(&trace);
                Box::pin(async move {
                    trace.lock().push(format!("{name}-before"));
                    let response = next(ctx, req).await;
                    trace.lock().push(format!("{name}-after"));
                    response
                })
            })
        })
    }

    fn terminal(trace: &Trace) -> Handler {
        let trace = Arc::clone(trace);
        handler_fn(move |_ctx, _req| {
            let trace = Arc::clone(&trace);
            Box::pin(async move {
                trace.lock().push("handler".to_string());
                Response::new(Full::new(Bytes::new()))
            })
        })
    }

    fn request() -> Request {
        Request::new(Full::new(Bytes::new()))
    }

    #[tokio::test]
    async fn test_stack_discipline() {
        let trace: Trace = Arc::default();
        let handler = chain(
            terminal(&trace),
            &[recording("m1", &trace), recording("m2", &trace), recording("m3", &trace)],
        );

        let mut ctx = RequestContext::new();
        handler(&mut ctx, request()).await;

        assert_eq!(
            *trace.lock(),
            vec![
                "m1-before", "m2-before", "m3-before", "handler", "m3-after", "m2-after",
                "m1-after"
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_is_terminal() {
        let trace: Trace = Arc::default();
        let terminal = terminal(&trace);
        let handler = chain(Arc::clone(&terminal), &[]);

        assert!(Arc::ptr_eq(&terminal, &handler));
        let mut ctx = RequestContext::new();
        handler(&mut ctx, request()).await;
        assert_eq!(*trace.lock(), vec!["handler"]);
    }

    #[tokio::test]
    async fn test_composition_has_no_side_effects() {
        let trace: Trace = Arc::default();
        let _handler = chain(terminal(&trace), &[recording("m1", &trace)]);
        assert!(trace.lock().is_empty());
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner() {
        let trace: Trace = Arc::default();
        let deny = middleware_fn("deny", |_next: Handler| {
            handler_fn(|_ctx, _req| {
                Box::pin(async move {
                    let mut response = Response::new(Full::new(Bytes::new()));
                    *response.status_mut() = StatusCode::FORBIDDEN;
                    response
                })
            })
        });
        let handler = chain(terminal(&trace), &[recording("outer", &trace), deny]);

        let mut ctx = RequestContext::new();
        let response = handler(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(*trace.lock(), vec!["outer-before", "outer-after"]);
    }

    #[test]
    fn test_pipeline_order_is_fixed() {
        let pipeline = Pipeline::builder().quiet_route("/healthz").build();
        assert_eq!(
            pipeline.stage_names(),
            vec!["recovery", "logger", "request_id", "real_ip"]
        );
    }
}
