//! Error taxonomy surfaced through the response envelope.
//!
//! Every failure a request can hit maps onto one of the [`ApiError`] kinds.
//! Known conditions (missing routes, body validation, admission-control
//! rejections, handler-declared errors) carry their own status codes.
//! Anything else becomes [`ApiError::Internal`], which generates an opaque
//! `error_id`, logs the full error chain under that id, and exposes only the
//! id to the client.

use http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

use crate::{
    response::error_response,
    responder::Responder,
    types::Response,
};

/// Request-processing error, rendered as a JSON envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No route matched, or the route does not accept the request method.
    #[error("not found")]
    NotFound,
    /// The request body failed to parse or to construct the declared model.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        /// Field-level errors forwarded in the envelope's `data`.
        errors: Option<Value>,
    },
    /// The token-bucket limiter denied admission.
    #[error("rate limit exceeded")]
    RateLimited,
    /// The circuit breaker is open.
    #[error("circuit breaker is open")]
    CircuitOpen,
    /// A handler raised a known error with its own code and message.
    #[error("{message}")]
    Handler {
        code: u16,
        message: String,
        detail: Option<Value>,
    },
    /// Any other fault; the chain is logged under `error_id`.
    #[error("internal server error")]
    Internal { error_id: String },
}

impl ApiError {
    /// Builds a validation error with a message and optional field errors.
    pub fn validation(message: impl Into<String>, errors: Option<Value>) -> Self {
        Self::Validation {
            message: message.into(),
            errors,
        }
    }

    /// Builds a handler-declared error with an explicit code.
    pub fn handler(code: u16, message: impl Into<String>) -> Self {
        Self::Handler {
            code,
            message: message.into(),
            detail: None,
        }
    }

    /// Wraps an untyped failure, logging its chain under a fresh error id.
    pub fn internal(err: anyhow::Error) -> Self {
        let error_id = new_error_id();
        tracing::error!(error_id = %error_id, error = ?err, "internal error");
        Self::Internal { error_id }
    }

    /// Wraps a plain message, logging it under a fresh error id.
    pub fn internal_msg(message: impl AsRef<str>) -> Self {
        let error_id = new_error_id();
        tracing::error!(error_id = %error_id, message = message.as_ref(), "internal error");
        Self::Internal { error_id }
    }

    /// HTTP status for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
            Self::Handler { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Generates a 16-hex-char opaque error id.
fn new_error_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

impl Responder for ApiError {
    fn into_response(self) -> Response {
        let code = self.status().as_u16();
        let (message, data) = match self {
            Self::NotFound => ("Not Found".to_string(), None),
            Self::Validation { message, errors } => (message, errors),
            Self::RateLimited => ("Rate limit exceeded".to_string(), None),
            Self::CircuitOpen => ("Circuit breaker is open".to_string(), None),
            Self::Handler {
                message, detail, ..
            } => (message, detail),
            Self::Internal { error_id } => (
                "Internal Server Error".to_string(),
                Some(json!({ "error_id": error_id })),
            ),
        };
        error_response(code, message, data).into_response()
    }
}
