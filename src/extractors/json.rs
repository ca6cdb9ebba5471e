//! JSON request body extraction.
//!
//! Validates the Content-Type header, buffers the body, and deserializes it
//! into the declared model. Failures answer with a validation envelope
//! carrying the parse error.

use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{errors::ApiError, extractors::FromRequest, types::Request};

/// JSON body extractor with automatic deserialization.
#[derive(Debug)]
pub struct Json<T>(pub T);

fn is_json_content_type(headers: &http::HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .map(|mime| {
            mime.type_() == mime::APPLICATION
                && (mime.subtype() == mime::JSON || mime.suffix().is_some_and(|s| s == "json"))
        })
        .unwrap_or(false)
}

impl<T> FromRequest for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Error = ApiError;

    fn from_request(
        req: &mut Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send {
        async move {
            if !is_json_content_type(req.headers()) {
                return Err(ApiError::validation(
                    "expected application/json content type",
                    None,
                ));
            }

            let body_bytes = req
                .body_mut()
                .collect()
                .await
                .map_err(|e| {
                    ApiError::validation(
                        "failed to read request body",
                        Some(json!({ "error": e.to_string() })),
                    )
                })?
                .to_bytes();

            let data = serde_json::from_slice(&body_bytes).map_err(|e| {
                ApiError::validation(
                    "invalid request data",
                    Some(json!({ "error": e.to_string() })),
                )
            })?;

            Ok(Json(data))
        }
    }
}
