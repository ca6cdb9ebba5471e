//! Route storage as a trie keyed by path segments.
//!
//! Patterns are split on `/`; each segment is a literal, a single-segment
//! parameter written `{name}`, or a trailing wildcard written `*` or
//! `*name` that captures the joined remainder of the path. Lookup walks the
//! trie one segment at a time preferring, in order, an exact literal child,
//! the parameter child, and the wildcard child. The precedence makes
//! `/users/me` win over `/users/{id}` no matter the registration order.
//!
//! A node is terminal exactly when it holds a handler. Parameter names do
//! not participate in identity: `/users/{id}` and `/users/{slug}` occupy the
//! same node, so re-registering a pattern whose canonical form and method
//! set overlap an existing route replaces it (the latest insertion wins, and
//! the conflict is logged).

use std::collections::HashMap;

use hyper::Method;
use tracing::warn;

use crate::{handler::BoxHandler, types::MethodSet};

/// One node of the route trie.
#[derive(Default)]
struct TrieNode {
    /// Literal child segments.
    children: HashMap<String, TrieNode>,
    /// Single-segment parameter child with its capture name.
    param_child: Option<Box<TrieNode>>,
    param_name: Option<String>,
    /// Trailing wildcard child with its capture name.
    wildcard_child: Option<Box<TrieNode>>,
    wildcard_name: Option<String>,
    /// Present iff this node terminates a registered pattern.
    terminal: Option<Terminal>,
}

struct Terminal {
    methods: MethodSet,
    handler: BoxHandler,
    pattern: String,
}

/// Result of a successful trie lookup.
#[derive(Clone)]
pub(crate) struct TrieMatch {
    pub handler: BoxHandler,
    pub methods: MethodSet,
    pub params: HashMap<String, String>,
    /// Canonical pattern of the matched route, for pattern-level stats.
    pub pattern: String,
}

/// Trie over registered route patterns.
#[derive(Default)]
pub(crate) struct RouteTrie {
    root: TrieNode,
}

impl RouteTrie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a pattern with its method set and handler.
    ///
    /// # Panics
    ///
    /// Panics on malformed patterns: an empty `{}` parameter or a wildcard
    /// segment that is not the final segment.
    pub fn insert(&mut self, pattern: &str, methods: MethodSet, handler: BoxHandler) {
        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = &mut self.root;

        for (idx, segment) in segments.iter().enumerate() {
            if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() {
                    panic!("empty parameter name in route pattern {pattern:?}");
                }
                if let Some(existing) = &node.param_name {
                    if existing != name {
                        warn!(
                            pattern,
                            old = %existing,
                            new = %name,
                            "parameter name differs from an earlier registration; keeping the new name"
                        );
                    }
                }
                node.param_name = Some(name.to_string());
                node = node.param_child.get_or_insert_with(Default::default).as_mut();
            } else if let Some(name) = segment.strip_prefix('*') {
                if idx != segments.len() - 1 {
                    panic!("wildcard must be the final segment in route pattern {pattern:?}");
                }
                let name = if name.is_empty() { "*" } else { name };
                node.wildcard_name = Some(name.to_string());
                node = node
                    .wildcard_child
                    .get_or_insert_with(Default::default)
                    .as_mut();
            } else {
                node = node.children.entry((*segment).to_string()).or_default();
            }
        }

        let canonical = canonical_pattern(pattern);
        if let Some(existing) = &node.terminal {
            if existing.methods.iter().any(|m| methods.contains(m)) {
                warn!(
                    pattern = %canonical,
                    "route redefined for an overlapping method set; the latest registration wins"
                );
            }
        }
        node.terminal = Some(Terminal {
            methods,
            handler,
            pattern: canonical,
        });
    }

    /// Looks up `path`, capturing parameters along the way.
    pub fn lookup(&self, path: &str) -> Option<TrieMatch> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = &self.root;
        let mut params = HashMap::new();

        let mut idx = 0;
        while idx < segments.len() {
            let segment = segments[idx];
            if let Some(child) = node.children.get(segment) {
                node = child;
            } else if let Some(child) = node.param_child.as_deref() {
                if let Some(name) = &node.param_name {
                    params.insert(name.clone(), segment.to_string());
                }
                node = child;
            } else if let Some(child) = node.wildcard_child.as_deref() {
                if let Some(name) = &node.wildcard_name {
                    params.insert(name.clone(), segments[idx..].join("/"));
                }
                node = child;
                break;
            } else {
                return None;
            }
            idx += 1;
        }

        node.terminal.as_ref().map(|t| TrieMatch {
            handler: t.handler.clone(),
            methods: t.methods.clone(),
            params,
            pattern: t.pattern.clone(),
        })
    }
}

/// Normalizes a pattern by replacing every parameter segment with `*`.
///
/// Two patterns are the same route when their canonical forms are equal.
pub(crate) fn canonical_pattern(pattern: &str) -> String {
    let parts: Vec<&str> = pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|part| {
            if part.starts_with('{') && part.ends_with('}') {
                "*"
            } else {
                part
            }
        })
        .collect();
    parts.join("/")
}

/// Builds a method set from a slice of methods.
pub(crate) fn method_set(methods: &[Method]) -> MethodSet {
    methods.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Request;

    fn handler(tag: &'static str) -> BoxHandler {
        BoxHandler::from_handler(move |_req: Request| async move { tag })
    }

    fn get() -> MethodSet {
        method_set(&[Method::GET])
    }

    #[test]
    fn literal_insert_then_lookup() {
        let mut trie = RouteTrie::new();
        trie.insert("/health", get(), handler("health"));

        let found = trie.lookup("/health").unwrap();
        assert!(found.methods.contains(&Method::GET));
        assert!(found.params.is_empty());
        assert_eq!(found.pattern, "health");
        assert!(trie.lookup("/missing").is_none());
    }

    #[test]
    fn param_segment_captures_value() {
        let mut trie = RouteTrie::new();
        trie.insert("/users/{id}", get(), handler("user"));

        let found = trie.lookup("/users/42").unwrap();
        assert_eq!(found.params.get("id"), Some(&"42".to_string()));
        assert_eq!(found.pattern, "users/*");
    }

    #[test]
    fn literal_beats_param() {
        let mut trie = RouteTrie::new();
        trie.insert("/users/{id}", get(), handler("param"));
        trie.insert("/users/me", get(), handler("literal"));

        let me = trie.lookup("/users/me").unwrap();
        assert!(me.params.is_empty());
        assert_eq!(me.pattern, "users/me");

        let other = trie.lookup("/users/7").unwrap();
        assert_eq!(other.params.get("id"), Some(&"7".to_string()));
    }

    #[test]
    fn param_beats_wildcard() {
        let mut trie = RouteTrie::new();
        trie.insert("/files/*rest", get(), handler("wild"));
        trie.insert("/files/{name}", get(), handler("param"));

        let one = trie.lookup("/files/report").unwrap();
        assert_eq!(one.params.get("name"), Some(&"report".to_string()));

        let deep = trie.lookup("/files/2024/q3/report.pdf").unwrap();
        assert_eq!(
            deep.params.get("rest"),
            Some(&"2024/q3/report.pdf".to_string())
        );
    }

    #[test]
    fn wildcard_captures_joined_remainder() {
        let mut trie = RouteTrie::new();
        trie.insert("/static/*path", get(), handler("static"));

        let found = trie.lookup("/static/css/app.css").unwrap();
        assert_eq!(found.params.get("path"), Some(&"css/app.css".to_string()));
    }

    #[test]
    fn empty_segments_are_ignored() {
        let mut trie = RouteTrie::new();
        trie.insert("/a/b", get(), handler("ab"));

        assert!(trie.lookup("//a///b/").is_some());
    }

    #[test]
    fn root_pattern_matches_root_path() {
        let mut trie = RouteTrie::new();
        trie.insert("/", get(), handler("root"));

        assert!(trie.lookup("/").is_some());
        assert!(trie.lookup("").is_some());
    }

    #[test]
    fn intermediate_node_is_not_terminal() {
        let mut trie = RouteTrie::new();
        trie.insert("/a/b/c", get(), handler("deep"));

        assert!(trie.lookup("/a/b").is_none());
    }

    #[test]
    fn latest_registration_wins_on_conflict() {
        let mut trie = RouteTrie::new();
        trie.insert("/users/{id}", get(), handler("first"));
        trie.insert("/users/{slug}", get(), handler("second"));

        let found = trie.lookup("/users/9").unwrap();
        // The replacement also renamed the capture.
        assert_eq!(found.params.get("slug"), Some(&"9".to_string()));
    }

    #[test]
    fn canonical_form_normalizes_params() {
        assert_eq!(canonical_pattern("/users/{id}/posts/{pid}"), "users/*/posts/*");
        assert_eq!(canonical_pattern("/health"), "health");
    }

    #[test]
    #[should_panic(expected = "wildcard must be the final segment")]
    fn interior_wildcard_panics() {
        let mut trie = RouteTrie::new();
        trie.insert("/files/*rest/meta", get(), handler("bad"));
    }
}
