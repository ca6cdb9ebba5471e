//! Path parameter extraction with scalar coercion.
//!
//! Captured segments are strings on the wire. Before deserializing into the
//! handler's declared type, each value is coerced to the tightest JSON
//! scalar it parses as (integer, then float, then boolean, falling back to
//! string). If the coerced map does not fit the declared type, extraction
//! retries with every value left as a string.
//!
//! Fields that should accept a segment whether or not it coerces are
//! declared as [`PathValue`]: for a route like `/users/{id}`, the handler
//! receives `PathValue::Int(42)` for `/users/42` and
//! `PathValue::Str("abc")` for `/users/abc`, and runs in both cases.
//! A field declared as a plain scalar (`i64`, `bool`, ...) opts into strict
//! typing instead, and a segment that does not fit answers a validation
//! envelope.

use std::{collections::HashMap, fmt, future::ready};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{errors::ApiError, extractors::FromRequest, types::Request};

/// Captured path parameters, inserted by the router on a successful match.
#[derive(Clone, Default)]
pub(crate) struct PathParams(pub HashMap<String, String>);

/// Typed view of the captured path parameters.
#[derive(Debug)]
pub struct Params<T>(pub T);

/// A captured path segment after scalar coercion.
///
/// Holds the coerced scalar when the segment parses as one and the raw
/// string otherwise, so extraction never fails on an ambiguous segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl PathValue {
    /// The integer value, when the segment coerced to one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The float value, when the segment coerced to one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// The boolean value, when the segment coerced to one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The raw string, when the segment did not coerce to a scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

fn coerce(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn to_map(params: &HashMap<String, String>, coerced: bool) -> Value {
    let map: Map<String, Value> = params
        .iter()
        .map(|(k, v)| {
            let value = if coerced {
                coerce(v)
            } else {
                Value::String(v.clone())
            };
            (k.clone(), value)
        })
        .collect();
    Value::Object(map)
}

impl<T> FromRequest for Params<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Error = ApiError;

    fn from_request(
        req: &mut Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send {
        let params = req
            .extensions()
            .get::<PathParams>()
            .cloned()
            .unwrap_or_default();

        let result = serde_json::from_value(to_map(&params.0, true))
            .or_else(|_| serde_json::from_value(to_map(&params.0, false)))
            .map(Params)
            .map_err(|err| {
                ApiError::validation(
                    "invalid path parameters",
                    Some(serde_json::json!({ "error": err.to_string() })),
                )
            });
        ready(result)
    }
}
