//! # Keycard
//!
//! Foundation for JSON-over-HTTP services:
//!
//! - **Routing**: method and path dispatch with scoped middleware groups
//! - **Request lifecycle**: panic recovery, request logging, request ids and
//!   client IP resolution in a fixed order
//! - **Graceful shutdown**: stop accepting, drain in-flight requests, report
//!   a missed grace period
//! - **Transactions**: ordered operations that commit together or roll back
//!   together, with database errors mapped to HTTP responses
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keycard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut router = Router::new();
//!     router.get("/healthz", handler_fn(|_ctx, _req| {
//!         Box::pin(async move { json_response(http::StatusCode::OK, &"ok") })
//!     }));
//!
//!     let handler = Pipeline::builder().build().wrap(router.into_handler());
//!     Server::run(ServerConfig::default(), handler).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Every request passes the lifecycle stages before reaching the router:
//!
//! ```text
//! Request → Recovery → Logger → RequestId → RealIp → Router → group middleware → Handler
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod items;

pub use keycard_config as config;
pub use keycard_core as core;
pub use keycard_database as database;
pub use keycard_middleware as middleware;
pub use keycard_router as router;
pub use keycard_server as server;
pub use keycard_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use keycard::prelude::*;
///
/// let router = Router::new();
/// assert_eq!(router.route_count(), 0);
/// ```
pub mod prelude {
    pub use keycard_config::{ConfigLoader, KeycardConfig};
    pub use keycard_core::{
        empty_response, handler_fn, json_response, middleware_fn, ApiError, Handler, Middleware,
        Request, RequestContext, Response, SharedMiddleware,
    };
    pub use keycard_database::{
        run_read_only_transaction, run_transaction, tx_fn, DbError, DbErrorKind, TxError,
    };
    pub use keycard_middleware::Pipeline;
    pub use keycard_server::{Router, Server, ServerConfig, ShutdownSignal};
    pub use keycard_telemetry::{Hub, Logger};
}
