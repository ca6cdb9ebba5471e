//! Per-request span recording.
//!
//! Each request gets a span named `HTTP {method} {path}` tagged with
//! method, path, scheme, and (once finished) the response status. Finished
//! spans are kept in a bounded ring and served by the `/_traces` builtin
//! endpoint.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;

use crate::response::epoch_seconds;

/// Maximum number of finished spans retained.
const MAX_STORED_SPANS: usize = 1000;

/// A single recorded span.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub tags: HashMap<String, String>,
}

impl Span {
    /// Span duration in seconds, once ended.
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Adds or replaces a tag.
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }
}

/// Records request spans into a bounded ring.
#[derive(Default)]
pub struct Tracer {
    spans: Mutex<VecDeque<Span>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a span; the caller owns it until [`Tracer::end_span`].
    pub fn start_span(&self, name: impl Into<String>, parent_span_id: Option<String>) -> Span {
        Span {
            trace_id: uuid::Uuid::new_v4().to_string(),
            span_id: uuid::Uuid::new_v4().to_string(),
            parent_span_id,
            name: name.into(),
            start_time: epoch_seconds(),
            end_time: None,
            tags: HashMap::new(),
        }
    }

    /// Stamps the end time and stores the span.
    pub fn end_span(&self, mut span: Span) {
        span.end_time = Some(epoch_seconds());
        let mut spans = self.spans.lock();
        if spans.len() >= MAX_STORED_SPANS {
            spans.pop_front();
        }
        spans.push_back(span);
    }

    /// All finished spans, oldest first.
    pub fn traces(&self) -> Vec<Span> {
        self.spans.lock().iter().cloned().collect()
    }
}
