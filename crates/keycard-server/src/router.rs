//! Request router.
//!
//! A [`Router`] owns a middleware chain and writes into a route table.
//! Handlers are composed when they are registered, as
//! `global chain ∘ per-route middleware ∘ handler`, so the chain that
//! applies to a route is the one in place at its registration.
//!
//! [`Router::group`] hands a closure a child router that writes into the
//! same table but holds its own copy of the chain. Middleware added inside
//! the group stays there; middleware added to the parent later does not
//! reach routes already registered in the group.
//!
//! # Example
//!
//! ```rust
//! use keycard_core::{handler_fn, json_response, middleware_fn, Handler};
//! use keycard_server::Router;
//! use http::StatusCode;
//!
//! let mut router = Router::new();
//! router.get("/healthz", handler_fn(|_ctx, _req| {
//!     Box::pin(async move { json_response(StatusCode::OK, &"ok") })
//! }));
//!
//! router.group(|admin| {
//!     admin.use_middleware(middleware_fn("audit", |next: Handler| next));
//!     admin.delete("/items/{id}", handler_fn(|_ctx, _req| {
//!         Box::pin(async move { json_response(StatusCode::NO_CONTENT, &()) })
//!     }));
//! });
//!
//! assert_eq!(router.route_count(), 2);
//! let handler = router.into_handler();
//! ```

use std::fmt;
use std::sync::Arc;

use http::header::{HeaderValue, ALLOW};
use http::Method;
use keycard_core::{handler_fn, ApiError, Handler, Response, SharedMiddleware};
use keycard_middleware::chain;
use keycard_router::{Lookup, RouteError, RouteTable};
use parking_lot::RwLock;

/// Maps method and path to handlers.
#[derive(Clone)]
pub struct Router {
    table: Arc<RwLock<RouteTable<Handler>>>,
    middleware: Vec<SharedMiddleware>,
}

impl Router {
    /// Creates a router with an empty table and chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(RouteTable::new())),
            middleware: Vec::new(),
        }
    }

    /// Appends to this router's chain.
    ///
    /// Applies to routes registered on this router afterwards, and to groups
    /// created afterwards.
    pub fn use_middleware(&mut self, middleware: SharedMiddleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers a handler, returning an error for a duplicate or malformed
    /// pattern.
    pub fn try_register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        extra: &[SharedMiddleware],
    ) -> Result<(), RouteError> {
        let mut stack = self.middleware.clone();
        stack.extend(extra.iter().cloned());
        let composed = chain(handler, &stack);

        self.table.write().insert(method.clone(), pattern, composed)?;
        tracing::debug!(%method, pattern, middleware = stack.len(), "registered route");
        Ok(())
    }

    /// Registers a handler.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate or malformed pattern. Routes are registered at
    /// startup, where a bad table is fatal.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        extra: &[SharedMiddleware],
    ) -> &mut Self {
        if let Err(e) = self.try_register(method, pattern, handler, extra) {
            panic!("{e}");
        }
        self
    }

    /// Registers a `GET` handler. `HEAD` requests are served by it too.
    pub fn get(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.register(Method::GET, pattern, handler, &[])
    }

    /// Registers a `POST` handler.
    pub fn post(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.register(Method::POST, pattern, handler, &[])
    }

    /// Registers a `PUT` handler.
    pub fn put(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.register(Method::PUT, pattern, handler, &[])
    }

    /// Registers a `PATCH` handler.
    pub fn patch(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.register(Method::PATCH, pattern, handler, &[])
    }

    /// Registers a `DELETE` handler.
    pub fn delete(&mut self, pattern: &str, handler: Handler) -> &mut Self {
        self.register(Method::DELETE, pattern, handler, &[])
    }

    /// Runs `f` with a child router sharing this router's table and starting
    /// from a copy of its chain.
    pub fn group<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        let mut child = Router {
            table: Arc::clone(&self.table),
            middleware: self.middleware.clone(),
        };
        f(&mut child);
        self
    }

    /// Returns the number of registered routes across all groups.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.table.read().len()
    }

    /// Returns the names of this router's chain, outermost first.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|mw| mw.name()).collect()
    }

    /// Returns the dispatching handler.
    ///
    /// A match binds path parameters on the context and calls the route's
    /// handler. A known path without the method gets a 405 with an `Allow`
    /// header; an unknown path gets a 404. Both use the standard error body.
    pub fn into_handler(self) -> Handler {
        let table = self.table;

        handler_fn(move |ctx, req| {
            let resolved = {
                let table = table.read();
                match table.lookup(req.method(), req.uri().path()) {
                    Lookup::Found(found) => Ok((Arc::clone(found.value), found.params)),
                    Lookup::MethodNotAllowed(allowed) => Err(Some(allowed)),
                    Lookup::NotFound => Err(None),
                }
            };

            match resolved {
                Ok((handler, params)) => {
                    ctx.set_params(params);
                    handler(ctx, req)
                }
                Err(Some(allowed)) => {
                    let response = method_not_allowed(req.method().clone(), &allowed);
                    Box::pin(async move { response })
                }
                Err(None) => Box::pin(async move { ApiError::NotFound.into_response() }),
            }
        })
    }
}

fn method_not_allowed(method: Method, allowed: &[Method]) -> Response {
    let mut response = ApiError::MethodNotAllowed(method).into_response();
    let list = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&list) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_count())
            .field("middleware", &self.middleware_names())
            .finish()
    }
}
