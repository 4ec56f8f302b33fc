//! Handler and middleware types.
//!
//! A [`Handler`] is a shared async function from a mutable request context
//! and a request to a response. A [`Middleware`] turns one handler into
//! another; stacking middleware is plain function composition, so all
//! wrapping happens once at registration time and each request only pays
//! for the calls themselves.
//!
//! # Example
//!
//! ```
//! use keycard_core::{handler_fn, middleware_fn, Handler, Response};
//!
//! let hello: Handler = handler_fn(|_ctx, _req| {
//!     Box::pin(async move { Response::new("hello".into()) })
//! });
//!
//! let timing = middleware_fn("timing", |next: Handler| {
//!     handler_fn(move |ctx, req| {
//!         let next = next.clone();
//!         Box::pin(async move {
//!             let response = next(ctx, req).await;
//!             tracing::debug!(elapsed_ms = ctx.elapsed().as_millis() as u64, "done");
//!             response
//!         })
//!     })
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;

use crate::context::RequestContext;

/// The request type seen by handlers. The body is fully buffered.
pub type Request = http::Request<Full<Bytes>>;

/// The response type produced by handlers.
pub type Response = http::Response<Full<Bytes>>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared request handler.
///
/// The returned future may borrow the context for the duration of the call.
pub type Handler =
    Arc<dyn for<'a> Fn(&'a mut RequestContext, Request) -> BoxFuture<'a, Response> + Send + Sync>;

/// Wraps a closure as a [`Handler`].
///
/// Passing the closure through this function pins down the higher-ranked
/// signature so the closure may return a future that borrows the context.
pub fn handler_fn<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut RequestContext, Request) -> BoxFuture<'a, Response>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// A function from handler to handler.
///
/// Composition order matters: the middleware applied last is the outermost
/// and runs its "before" logic first.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs and debugging.
    fn name(&self) -> &'static str;

    /// Returns a handler that runs this stage around `next`.
    fn wrap(&self, next: Handler) -> Handler;
}

/// Shared middleware, as stored in router chains.
pub type SharedMiddleware = Arc<dyn Middleware>;

/// A middleware built from a closure. See [`middleware_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    wrap: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn wrap(&self, next: Handler) -> Handler {
        (self.wrap)(next)
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").field("name", &self.name).finish()
    }
}

/// Creates a shared middleware from a handler-to-handler closure.
pub fn middleware_fn<F>(name: &'static str, wrap: F) -> SharedMiddleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(FnMiddleware { name, wrap })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[tokio::test]
    async fn test_handler_borrows_context() {
        let handler = handler_fn(|ctx, _req| {
            Box::pin(async move {
                let mut response = Response::new(Full::new(Bytes::new()));
                if ctx.param("id").is_none() {
                    *response.status_mut() = StatusCode::BAD_REQUEST;
                }
                response
            })
        });

        let mut ctx = RequestContext::new();
        let response = handler(&mut ctx, Request::new(Full::new(Bytes::new()))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_fn_middleware_wraps() {
        let inner = handler_fn(|_ctx, _req| {
            Box::pin(async move { Response::new(Full::new(Bytes::from("inner"))) })
        });
        let teapot = middleware_fn("teapot", |next: Handler| {
            handler_fn(move |ctx, req| {
                let next = next.clone();
                Box::pin(async move {
                    let mut response = next(ctx, req).await;
                    *response.status_mut() = StatusCode::IM_A_TEAPOT;
                    response
                })
            })
        });

        assert_eq!(teapot.name(), "teapot");
        let wrapped = teapot.wrap(inner);
        let mut ctx = RequestContext::new();
        let response = wrapped(&mut ctx, Request::new(Full::new(Bytes::new()))).await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }
}
