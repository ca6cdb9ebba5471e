//! Per-request performance counters.
//!
//! The monitor aggregates request durations, status-code counts, and
//! per-path statistics, and keeps a bounded ring of recent requests. It is
//! fed by the telemetry middleware and read back by the `/_metrics` builtin
//! endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Maximum number of recent requests retained.
const MAX_STORED_REQUESTS: usize = 1000;

/// One completed request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub path: String,
    pub method: String,
    pub start_time: f64,
    pub duration_ms: f64,
    pub status_code: u16,
}

/// Aggregated per-path counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathStats {
    pub count: u64,
    pub total_time_ms: f64,
    pub errors: u64,
}

/// Snapshot returned by [`PerformanceMonitor::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub total_requests: u64,
    pub current_requests: u64,
    pub average_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub error_rate: f64,
    pub status_codes: HashMap<u16, u64>,
    pub path_stats: HashMap<String, PathStats>,
}

#[derive(Default)]
struct MonitorInner {
    recent: VecDeque<RequestMetrics>,
    total_requests: u64,
    total_time_ms: f64,
    max_time_ms: f64,
    min_time_ms: Option<f64>,
    error_count: u64,
    status_codes: HashMap<u16, u64>,
    path_stats: HashMap<String, PathStats>,
}

/// Collects request-level metrics under a lightweight lock.
#[derive(Default)]
pub struct PerformanceMonitor {
    inner: Mutex<MonitorInner>,
    current_requests: AtomicU64,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a request as in flight.
    pub fn request_started(&self) {
        self.current_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished request.
    pub fn record(
        &self,
        path: &str,
        method: &str,
        start_time: f64,
        duration: Duration,
        status_code: u16,
    ) {
        self.current_requests.fetch_sub(1, Ordering::Relaxed);
        let duration_ms = duration.as_secs_f64() * 1000.0;

        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        inner.total_time_ms += duration_ms;
        inner.max_time_ms = inner.max_time_ms.max(duration_ms);
        inner.min_time_ms = Some(match inner.min_time_ms {
            Some(min) => min.min(duration_ms),
            None => duration_ms,
        });
        *inner.status_codes.entry(status_code).or_default() += 1;

        let is_error = status_code >= 500;
        if is_error {
            inner.error_count += 1;
        }
        let path_stat = inner.path_stats.entry(path.to_string()).or_default();
        path_stat.count += 1;
        path_stat.total_time_ms += duration_ms;
        if is_error {
            path_stat.errors += 1;
        }

        if inner.recent.len() >= MAX_STORED_REQUESTS {
            inner.recent.pop_front();
        }
        inner.recent.push_back(RequestMetrics {
            path: path.to_string(),
            method: method.to_string(),
            start_time,
            duration_ms,
            status_code,
        });
    }

    /// Snapshot of the aggregated counters.
    pub fn stats(&self) -> MonitorStats {
        let inner = self.inner.lock();
        let total = inner.total_requests;
        MonitorStats {
            total_requests: total,
            current_requests: self.current_requests.load(Ordering::Relaxed),
            average_response_time_ms: if total == 0 {
                0.0
            } else {
                inner.total_time_ms / total as f64
            },
            max_response_time_ms: inner.max_time_ms,
            min_response_time_ms: inner.min_time_ms.unwrap_or(0.0),
            error_rate: if total == 0 {
                0.0
            } else {
                inner.error_count as f64 / total as f64
            },
            status_codes: inner.status_codes.clone(),
            path_stats: inner.path_stats.clone(),
        }
    }

    /// Recent requests, oldest first.
    pub fn recent(&self) -> Vec<RequestMetrics> {
        self.inner.lock().recent.iter().cloned().collect()
    }
}
