//! Query string extraction.

use std::future::ready;

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{errors::ApiError, extractors::FromRequest, types::Request};

/// Query parameter extractor; an absent query string parses as empty.
pub struct Query<T>(pub T);

impl<T> FromRequest for Query<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Error = ApiError;

    fn from_request(
        req: &mut Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send {
        let query = req.uri().query().unwrap_or("");
        let result = serde_urlencoded::from_str(query)
            .map(Query)
            .map_err(|e| {
                ApiError::validation(
                    "invalid query parameters",
                    Some(json!({ "error": e.to_string() })),
                )
            });
        ready(result)
    }
}
