//! Typed extraction of request data.
//!
//! Extractors turn pieces of a request into handler arguments: captured
//! path parameters, JSON or form bodies, query strings, raw bytes, and the
//! application context. Handlers declare extractor arguments and the
//! dispatch machinery runs [`FromRequest`] for each one before invoking the
//! function. Extraction failures surface as [`crate::errors::ApiError`]
//! values, so a malformed body answers with a validation envelope before
//! the handler ever runs.

/// Application-context extraction for handlers.
pub mod context;

/// Form body (application/x-www-form-urlencoded) parsing.
pub mod form;

/// JSON request body parsing and deserialization.
pub mod json;

/// Path parameter extraction from dynamic route segments.
pub mod params;

/// Query parameter parsing from URL query strings.
pub mod query;

/// Raw byte extraction for opaque request bodies.
pub mod raw;

/// Trait for extracting data from an HTTP request.
pub trait FromRequest: Sized {
    /// Error type returned when extraction fails.
    type Error: crate::responder::Responder;

    /// Extracts the type from the HTTP request.
    fn from_request(
        req: &mut crate::types::Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send;
}
