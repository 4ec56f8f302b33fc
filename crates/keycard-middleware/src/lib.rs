//! # Keycard Middleware
//!
//! Middleware composition and the request lifecycle stack.
//!
//! ```text
//! Request → Recovery → Logger → RequestId → RealIp → app middleware → Router → Handler
//!                                                                                  ↓
//! Response ← Recovery ← Logger ← RequestId ← RealIp ← ─────────────────────────────┘
//! ```
//!
//! | Stage      | Purpose                                               |
//! |------------|-------------------------------------------------------|
//! | Recovery   | Per-request hub, panic to bodiless 500, error report  |
//! | Logger     | Per-request logger, one `request` line per response   |
//! | Request ID | UUID v7 id on context, logger, hub and response       |
//! | Real IP    | Client address from `X-Forwarded-For` / `X-Real-IP`   |
//!
//! ## Example
//!
//! ```
//! use keycard_middleware::Pipeline;
//!
//! let pipeline = Pipeline::builder().quiet_route("/healthz").build();
//! assert_eq!(
//!     pipeline.stage_names(),
//!     vec!["recovery", "logger", "request_id", "real_ip"]
//! );
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod stages;

pub use chain::{chain, Pipeline, PipelineBuilder};
pub use stages::{
    LoggerMiddleware, PanicError, RealIpMiddleware, RecoveryMiddleware, RequestIdMiddleware,
    REQUEST_ID_HEADER,
};
