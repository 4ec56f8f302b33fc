//! Client address resolution.
//!
//! Behind a load balancer the socket peer is the proxy, not the caller.
//! This stage reads the first `X-Forwarded-For` entry, falling back to
//! `X-Real-IP`, and records it on the context. Values that do not parse as
//! an IP address are ignored, leaving the socket peer in place.

use std::net::IpAddr;

use http::HeaderMap;
use keycard_core::{handler_fn, Handler, Middleware};

/// `X-Forwarded-For` header name.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// `X-Real-IP` header name.
pub const X_REAL_IP: &str = "x-real-ip";

/// Middleware that resolves the client IP from proxy headers.
#[derive(Debug, Clone)]
pub struct RealIpMiddleware {
    trust_forwarded: bool,
}

impl RealIpMiddleware {
    /// Creates a stage that honours proxy headers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trust_forwarded: true,
        }
    }

    /// Creates a stage that always reports the socket peer.
    #[must_use]
    pub fn peer_only() -> Self {
        Self {
            trust_forwarded: false,
        }
    }
}

impl Default for RealIpMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the client address reported by a proxy.
#[must_use]
pub fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded_for = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    forwarded_for.or_else(|| {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    })
}

impl Middleware for RealIpMiddleware {
    fn name(&self) -> &'static str {
        "real_ip"
    }

    fn wrap(&self, next: Handler) -> Handler {
        if !self.trust_forwarded {
            return next;
        }

        handler_fn(move |ctx, req| {
            let next = next.clone();
            Box::pin(async move {
                if let Some(ip) = forwarded_ip(req.headers()) {
                    ctx.set_client_ip(ip);
                }
                next(ctx, req).await
            })
        })
    }
}
