//! URL-encoded form body extraction.

use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{errors::ApiError, extractors::FromRequest, types::Request};

/// Form body extractor for `application/x-www-form-urlencoded` payloads.
pub struct Form<T>(pub T);

fn is_form_content_type(headers: &http::HeaderMap) -> bool {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .map(|mime| {
            mime.type_() == mime::APPLICATION && mime.subtype() == mime::WWW_FORM_URLENCODED
        })
        .unwrap_or(false)
}

impl<T> FromRequest for Form<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Error = ApiError;

    fn from_request(
        req: &mut Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send {
        async move {
            if !is_form_content_type(req.headers()) {
                return Err(ApiError::validation(
                    "expected application/x-www-form-urlencoded content type",
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

            let data = serde_urlencoded::from_bytes(&body_bytes).map_err(|e| {
                ApiError::validation(
                    "invalid form data",
                    Some(json!({ "error": e.to_string() })),
                )
            })?;

            Ok(Form(data))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::ArborBody;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Login {
        user: String,
        remember: Option<bool>,
    }

    #[tokio::test]
    async fn parses_urlencoded_body() {
        let mut req = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri("/login")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(ArborBody::from("user=ada&remember=true"))
            .unwrap();

        let Form(login) = Form::<Login>::from_request(&mut req).await.unwrap();
        assert_eq!(login.user, "ada");
        assert_eq!(login.remember, Some(true));
    }

    #[tokio::test]
    async fn wrong_content_type_is_rejected() {
        let mut req = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri("/login")
            .header("content-type", "application/json")
            .body(ArborBody::from("user=ada"))
            .unwrap();
        assert!(Form::<Login>::from_request(&mut req).await.is_err());
    }
}
