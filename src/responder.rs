//! Conversion of handler return values into HTTP responses.
//!
//! Handlers may return plain text, status/body tuples, prebuilt responses,
//! the JSON envelope from [`crate::response`], or `Result`s of any of those.
//! The [`Responder`] trait unifies them so the dispatch path only ever deals
//! with [`Response`] values.

use std::{convert::Infallible, fmt::Display};

use bytes::Bytes;
use http::{Response as HttpResponse, StatusCode};
use http_body_util::Full;

use crate::{body::ArborBody, errors::ApiError, types::Response};

/// Trait for converting values into HTTP responses.
pub trait Responder {
    /// Converts the value into an HTTP response.
    fn into_response(self) -> Response;
}

impl Responder for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl Responder for &'static str {
    fn into_response(self) -> Response {
        HttpResponse::new(ArborBody::new(Full::from(Bytes::from_static(
            self.as_bytes(),
        ))))
    }
}

impl Responder for String {
    fn into_response(self) -> Response {
        HttpResponse::new(ArborBody::new(Full::from(Bytes::from(self))))
    }
}

impl Responder for () {
    fn into_response(self) -> Response {
        HttpResponse::new(ArborBody::empty())
    }
}

impl Responder for Infallible {
    fn into_response(self) -> Response {
        match self {}
    }
}

impl<R> Responder for (StatusCode, R)
where
    R: Display,
{
    fn into_response(self) -> Response {
        let (status, body) = self;
        let mut res = HttpResponse::new(ArborBody::from(body.to_string()));
        *res.status_mut() = status;
        res
    }
}

impl Responder for ArborBody {
    fn into_response(self) -> Response {
        HttpResponse::new(self)
    }
}

/// Fallible handlers surface their error through the envelope taxonomy.
impl<R> Responder for Result<R, ApiError>
where
    R: Responder,
{
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(err) => err.into_response(),
        }
    }
}

/// Untyped failures become an internal-error envelope with a logged id.
impl Responder for anyhow::Error {
    fn into_response(self) -> Response {
        ApiError::internal(self).into_response()
    }
}

impl<R> Responder for Result<R, anyhow::Error>
where
    R: Responder,
{
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(err) => err.into_response(),
        }
    }
}
