//! Lifecycle stages.
//!
//! Listed outermost first, the order [`Pipeline`](crate::Pipeline) applies
//! them in:
//!
//! 1. [`recovery`] - panic to 500, error report
//! 2. [`logger`] - request logger and request line
//! 3. [`request_id`] - request id on context, logger, hub and response
//! 4. [`real_ip`] - client address from proxy headers

pub mod logger;
pub mod real_ip;
pub mod recovery;
pub mod request_id;

pub use logger::LoggerMiddleware;
pub use real_ip::RealIpMiddleware;
pub use recovery::{PanicError, RecoveryMiddleware};
pub use request_id::{RequestIdMiddleware, REQUEST_ID_HEADER};
