//! HTTP error responses.
//!
//! Every error outcome leaves the service as a JSON body of the shape
//! `{"error": <string-or-object>}` with a matching status code. Other
//! services parse this envelope, so its shape and messages are stable.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::context::RequestContext;
use crate::handler::Response;

/// Field name to message map returned for validation failures.
pub type ValidationErrors = BTreeMap<String, String>;

/// An error that maps to an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Unexpected failure. The cause is never shown to the caller.
    #[error("the server encountered a problem and could not process your request")]
    Internal,

    /// No route or record.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The path exists but not for this method.
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    /// Malformed request; the message is shown to the caller.
    #[error("{0}")]
    BadRequest(String),

    /// Input validation failed.
    #[error("failed validation")]
    FailedValidation(ValidationErrors),

    /// Optimistic concurrency conflict.
    #[error("unable to update record due to an edit conflict, please try again")]
    EditConflict,

    /// Expected version header did not match the stored version.
    #[error("unable to update record due to a version conflict, please try again")]
    VersionMismatch,

    /// Delete blocked by dependent rows.
    #[error("the resource you're trying to delete has dependents")]
    HasDependents,

    /// Unique constraint hit on create.
    #[error("the resource you're trying to create already exists: {0}")]
    AlreadyExists(String),

    /// Other constraint hit on create.
    #[error("the resource you're trying to create violates a constraint: {0}")]
    ConstraintViolation(String),

    /// Caller lacks permission.
    #[error("you are not authorized to access this resource")]
    Forbidden,

    /// The request took too long.
    #[error("the request timed out")]
    Timeout,
}

impl ApiError {
    /// Returns the status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EditConflict
            | Self::VersionMismatch
            | Self::HasDependents
            | Self::AlreadyExists(_)
            | Self::ConstraintViolation(_) => StatusCode::CONFLICT,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// Returns the value placed under `"error"` in the body.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::FailedValidation(errors) => json!(errors),
            other => Value::String(other.to_string()),
        }
    }

    /// Builds the error response.
    #[must_use]
    pub fn into_response(self) -> Response {
        json_response(self.status_code(), &json!({ "error": self.body() }))
    }

    /// Logs `err` through the request logger, reports it to the request hub,
    /// and returns the generic 500 response.
    ///
    /// Falls back to the global subscriber when the request has no logger
    /// or hub attached.
    pub fn server_error<E>(ctx: &RequestContext, err: &E) -> Response
    where
        E: StdError + ?Sized,
    {
        match ctx.try_logger() {
            Some(logger) => logger
                .span()
                .in_scope(|| tracing::error!(error = %err, "server error")),
            None => tracing::error!(error = %err, "server error"),
        }
        if let Some(hub) = ctx.try_hub() {
            hub.capture_error(err);
        }
        Self::Internal.into_response()
    }
}

/// Builds a JSON response. Serialization failures produce a bare 500.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response body");
            empty_response(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Builds a response with no body.
pub fn empty_response(status: StatusCode) -> Response {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        err.into_response()
    }
}
