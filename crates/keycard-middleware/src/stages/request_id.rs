//! Request ID middleware.
//!
//! Assigns every request a UUID v7 identifier, stamps it on the request
//! logger and the request hub, and echoes it back in `X-Request-ID`.
//!
//! An incoming `X-Request-ID` is honoured only when the stage was built with
//! [`RequestIdMiddleware::trust_incoming`] and the value parses as a UUID.
//! Anything else is replaced by a freshly generated id.

use http::header::HeaderValue;
use keycard_core::{handler_fn, Handler, Middleware, Request, RequestId};

/// The header name for request ID propagation.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Field name used on the logger and as the hub tag.
const REQUEST_ID_FIELD: &str = "request_id";

/// Middleware that generates or extracts request IDs.
///
/// # Behavior
///
/// 1. Read `X-Request-ID` when trusted and valid, otherwise generate an id
/// 2. Store it on the [`RequestContext`](keycard_core::RequestContext)
/// 3. Add it to the request logger fields and the hub tags
/// 4. Set it on the response
///
/// # Example
///
/// ```ignore
/// use keycard_middleware::stages::request_id::RequestIdMiddleware;
///
/// let handler = RequestIdMiddleware::trust_incoming().wrap(inner);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    /// Whether incoming request ID headers are honoured.
    ///
    /// Typically `false` for edge traffic and `true` behind a gateway that
    /// already assigns ids.
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Creates a stage that always generates a new id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stage that reuses a valid incoming `X-Request-ID`.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
        }
    }

    /// Whether incoming ids are honoured.
    #[must_use]
    pub fn trusts_incoming(&self) -> bool {
        self.trust_incoming
    }

    fn extract_request_id(trust_incoming: bool, request: &Request) -> Option<RequestId> {
        if !trust_incoming {
            return None;
        }

        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn wrap(&self, next: Handler) -> Handler {
        let trust_incoming = self.trust_incoming;

        handler_fn(move |ctx, req| {
            let next = next.clone();
            Box::pin(async move {
                let candidate = Self::extract_request_id(trust_incoming, &req)
                    .unwrap_or_else(RequestId::new);
                ctx.set_request_id(candidate);

                // An id assigned further out wins over the candidate.
                let request_id = ctx.request_id().unwrap_or(candidate);
                let value = request_id.to_string();

                if ctx.try_logger().is_some() {
                    ctx.augment_logger(REQUEST_ID_FIELD, value.clone());
                }
                if ctx.try_hub().is_some() {
                    ctx.hub_mut().set_tag(REQUEST_ID_FIELD, value.clone());
                }

                let mut response = next(ctx, req).await;

                match HeaderValue::from_str(&value) {
                    Ok(header) => {
                        response.headers_mut().insert(REQUEST_ID_HEADER, header);
                    }
                    Err(e) => tracing::warn!(error = %e, "request id is not a valid header value"),
                }
                response
            })
        })
    }
}
