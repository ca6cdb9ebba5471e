//! Request monitoring and span recording middleware.
//!
//! Two middlewares are installed: the monitor times every request and feeds
//! the aggregated counters, and the tracer opens a span per request, tags
//! it with method, path, scheme, and final status, and stores it when the
//! response has been produced.

use std::{sync::Arc, time::Instant};

use anyhow::Result;

use crate::{
    metrics::PerformanceMonitor,
    plugins::ArborPlugin,
    response::epoch_seconds,
    router::Router,
    tracer::Tracer,
};

/// Telemetry plugin wiring the monitor and tracer into the chain.
#[derive(Clone)]
pub struct TelemetryPlugin {
    monitor: Arc<PerformanceMonitor>,
    tracer: Arc<Tracer>,
}

impl TelemetryPlugin {
    pub fn new(monitor: Arc<PerformanceMonitor>, tracer: Arc<Tracer>) -> Self {
        Self { monitor, tracer }
    }
}

impl ArborPlugin for TelemetryPlugin {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn setup(&self, router: &Router) -> Result<()> {
        let monitor = self.monitor.clone();
        router.middleware(move |req, next| {
            let monitor = monitor.clone();
            let path = req.uri().path().to_string();
            let method = req.method().to_string();
            async move {
                monitor.request_started();
                let start_epoch = epoch_seconds();
                let started = Instant::now();
                let res = next.run(req).await;
                monitor.record(
                    &path,
                    &method,
                    start_epoch,
                    started.elapsed(),
                    res.status().as_u16(),
                );
                res
            }
        });

        let tracer = self.tracer.clone();
        router.middleware(move |req, next| {
            let tracer = tracer.clone();
            let path = req.uri().path().to_string();
            let method = req.method().to_string();
            let scheme = req
                .uri()
                .scheme_str()
                .unwrap_or("http")
                .to_string();
            async move {
                let mut span = tracer.start_span(format!("HTTP {method} {path}"), None);
                span.tag("http.method", method.clone());
                span.tag("http.path", path.clone());
                span.tag("http.scheme", scheme);
                let res = next.run(req).await;
                span.tag("http.status_code", res.status().as_u16().to_string());
                tracer.end_span(span);
                res
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{body::ArborBody, types::Request};
    use http::Method;

    fn get(path: &str) -> Request {
        hyper::Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(ArborBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn records_metrics_and_spans_per_request() {
        let monitor = Arc::new(PerformanceMonitor::new());
        let tracer = Arc::new(Tracer::new());
        let router = Router::new();
        router.plugin(TelemetryPlugin::new(monitor.clone(), tracer.clone()));
        router.setup_plugins_once();
        router.route(Method::GET, "/users/{id}", || async { "user" });

        router.dispatch(get("/users/1")).await;
        router.dispatch(get("/missing")).await;

        let stats = monitor.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.status_codes[&200], 1);
        assert_eq!(stats.status_codes[&404], 1);
        assert_eq!(stats.path_stats["/users/1"].count, 1);

        let traces = tracer.traces();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].name, "HTTP GET /users/1");
        assert_eq!(traces[0].tags["http.status_code"], "200");
        assert_eq!(traces[1].tags["http.status_code"], "404");
    }
}
