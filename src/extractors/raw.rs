//! Opaque request body extraction.
//!
//! Bodies with content types the framework does not interpret are handed to
//! the handler as raw bytes.

use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::json;

use crate::{errors::ApiError, extractors::FromRequest, types::Request};

/// Buffers the whole request body as bytes.
pub struct RawBody(pub Bytes);

impl FromRequest for RawBody {
    type Error = ApiError;

    fn from_request(
        req: &mut Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send {
        async move {
            let bytes = req
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
            Ok(RawBody(bytes))
        }
    }
}
