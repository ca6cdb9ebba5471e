//! Registered route metadata.
//!
//! The trie owns the handlers; this registry keeps the human-readable side
//! of every registration (pattern, accepted methods, tags) for the
//! introspection and docs endpoints.

use serde::Serialize;

use crate::types::MethodSet;

/// A route entry as registered with the router.
#[derive(Debug, Clone, Serialize)]
pub struct Route {
    /// Path pattern, e.g. `/users/{id}`.
    pub pattern: String,
    /// Accepted HTTP methods.
    pub methods: Vec<String>,
    /// Tags for documentation grouping.
    pub tags: Vec<String>,
}

impl Route {
    pub(crate) fn new(pattern: &str, methods: &MethodSet, tags: &[&str]) -> Self {
        Self {
            pattern: pattern.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}
