//! # Keycard Core
//!
//! Core types shared by every Keycard crate:
//!
//! - [`RequestContext`] - per-request state (logger, hub, request id, path
//!   parameters) threaded through middleware and handlers
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Handler`] / [`Middleware`] - the async handler type and the
//!   handler-to-handler middleware trait
//! - [`ApiError`] - the `{"error": ...}` error-response contract

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod handler;

pub use context::{RequestContext, RequestId};
pub use error::{empty_response, json_response, ApiError, ValidationErrors};
pub use handler::{
    handler_fn, middleware_fn, BoxFuture, FnMiddleware, Handler, Middleware, Request, Response,
    SharedMiddleware,
};

/// Re-export so handlers can read path parameters without another dependency.
pub use keycard_router::Params;
