//! # Keycard Server
//!
//! Routing and serving for Keycard services.
//!
//! - [`Router`]: method and path dispatch with per-group middleware chains
//! - [`Server`]: HTTP/1.1 on Hyper with graceful, bounded shutdown
//! - [`ShutdownSignal`]: OS or programmatic shutdown trigger
//!
//! ## Example
//!
//! ```rust,ignore
//! use keycard_core::{handler_fn, json_response};
//! use keycard_middleware::Pipeline;
//! use keycard_server::{Router, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keycard_server::ServerError> {
//!     let mut router = Router::new();
//!     router.get("/healthz", handler_fn(|_ctx, _req| {
//!         Box::pin(async move { json_response(http::StatusCode::OK, &"ok") })
//!     }));
//!
//!     let handler = Pipeline::builder().build().wrap(router.into_handler());
//!     Server::run(ServerConfig::default(), handler).await
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod router;
pub mod server;
pub mod shutdown;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::ServerError;
pub use router::Router;
pub use server::Server;
pub use shutdown::{ConnectionTracker, ServerState, ShutdownSignal, StateCell};
