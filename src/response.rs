//! Canonical JSON response envelope.
//!
//! Every framework-produced response body has the shape
//! `{ "code": <int>, "message": <string>, "data": <any|null>, "timestamp": <epoch-seconds> }`.
//! `code` is 200 for success and mirrors the HTTP status for errors. Handlers
//! normally return an [`ApiResponse`] built through [`success_response`] or
//! [`error_response`]; raw [`serde_json::Value`]s are wrapped into a success
//! envelope automatically. A handler that needs full control of headers and
//! body (HTML pages, for example) returns a [`Response`] directly and
//! bypasses the envelope.

use std::time::{SystemTime, UNIX_EPOCH};

use http::{Response as HttpResponse, StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{body::ArborBody, responder::Responder, types::Response};

/// Unified API response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Application status code; 200 on success, mirrors HTTP status on error.
    pub code: u16,
    /// Human-readable status message.
    pub message: String,
    /// Payload, if any.
    pub data: Option<T>,
    /// Epoch seconds at which the envelope was built.
    pub timestamp: f64,
}

impl<T> ApiResponse<T> {
    /// Builds an envelope with the given code, message, and payload.
    pub fn new(code: u16, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
            timestamp: epoch_seconds(),
        }
    }
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Decodes an envelope from its serialized JSON form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Builds a success envelope around `data`.
pub fn success_response<T>(data: T) -> ApiResponse<T> {
    ApiResponse::new(200, "success", Some(data))
}

/// Builds an error envelope with an optional detail payload.
pub fn error_response<T>(code: u16, message: impl Into<String>, data: Option<T>) -> ApiResponse<T> {
    ApiResponse::new(code, message, data)
}

/// Current wall-clock time as fractional epoch seconds.
pub(crate) fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Builds an HTML response that bypasses the JSON envelope.
pub fn html_response(html: impl Into<String>) -> Response {
    let mut res = HttpResponse::new(ArborBody::from(html.into()));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    res
}

impl<T> Responder for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        let bytes = match serde_json::to_vec(&self) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize response envelope");
                let fallback = format!(
                    r#"{{"code":500,"message":"serialization failed","data":null,"timestamp":{}}}"#,
                    epoch_seconds()
                );
                let mut res = HttpResponse::new(ArborBody::from(fallback));
                *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                res.headers_mut().insert(
                    header::CONTENT_TYPE,
                    header::HeaderValue::from_static("application/json; charset=utf-8"),
                );
                return res;
            }
        };

        let mut res = HttpResponse::new(ArborBody::chunked(bytes.into()));
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json; charset=utf-8"),
        );
        res
    }
}

/// A bare JSON value is wrapped into a success envelope.
impl Responder for serde_json::Value {
    fn into_response(self) -> Response {
        success_response(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    #[test]
    fn envelope_roundtrip_is_identity() {
        let env = success_response(json!({"items": [1, 2, 3], "next": null}));
        let bytes = serde_json::to_vec(&env).unwrap();
        let decoded: ApiResponse<Value> = ApiResponse::from_json(&bytes).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn error_envelope_mirrors_code() {
        let env: ApiResponse<Value> = error_response(503, "service unavailable", None);
        assert_eq!(env.code, 503);
        assert_eq!(env.message, "service unavailable");
        assert!(env.data.is_none());
        assert!(env.timestamp > 0.0);
    }

    #[tokio::test]
    async fn raw_value_is_wrapped_as_success() {
        let res = json!({"id": 42}).into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let env: ApiResponse<Value> = ApiResponse::from_json(&body).unwrap();
        assert_eq!(env.code, 200);
        assert_eq!(env.data, Some(json!({"id": 42})));
    }

    #[tokio::test]
    async fn envelope_status_follows_code() {
        let res = error_response::<Value>(429, "rate limit exceeded", None).into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn html_response_bypasses_envelope() {
        let res = html_response("<h1>docs</h1>");
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    }
}
