//! The framework instance.
//!
//! [`App`] ties the subsystems together: it owns the router, the value
//! cache, the admission controls (limiter and breaker), the task queue, and
//! the telemetry sinks, and exposes them to handlers through an
//! [`AppContext`] inserted into every request. Construction wires the
//! default middleware stack (breaker, limiter, telemetry, compression) and
//! mounts the builtin introspection routes; startup spawns the cache
//! sweepers and queue workers and runs the registered lifecycle hooks,
//! exactly once, before the first request is handled.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use futures_util::future::BoxFuture;
use hyper::Method;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    breaker::CircuitBreaker,
    cache::{CacheBuilder, DEFAULT_SWEEP_INTERVAL, LruCache, RemoteStore},
    config::{AppConfig, CacheKind},
    errors::ApiError,
    limiter::TokenBucket,
    metrics::PerformanceMonitor,
    plugins::{
        circuit_breaker::CircuitBreakerPlugin, compression::CompressionBuilder,
        rate_limit::RateLimitPlugin, telemetry::TelemetryPlugin,
    },
    queue::TaskQueue,
    response::{epoch_seconds, html_response, success_response},
    route_cache::DEFAULT_HOT_THRESHOLD,
    router::Router,
    tracer::Tracer,
    types::{Request, Response},
};

/// Lifecycle events hooks can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Startup,
    Shutdown,
}

type EventHook = Arc<dyn Fn(Arc<AppContext>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Components owned by the framework instance, shared with handlers.
pub struct AppContext {
    /// Effective configuration.
    pub config: AppConfig,
    /// General-purpose value cache.
    pub cache: LruCache<Value>,
    /// Token bucket gating admissions.
    pub limiter: Arc<TokenBucket>,
    /// Circuit breaker gating admissions.
    pub breaker: Arc<CircuitBreaker>,
    /// Background task queue.
    pub queue: TaskQueue,
    /// Request metrics sink.
    pub monitor: Arc<PerformanceMonitor>,
    /// Request span sink.
    pub tracer: Arc<Tracer>,
    remote: RwLock<Option<Arc<dyn RemoteStore>>>,
    started_at: Instant,
    shutdown: CancellationToken,
}

impl AppContext {
    /// Time since the instance was created.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Token cancelled when the application shuts down; long-running
    /// handlers poll it to exit early.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The attached remote store, if any.
    pub fn remote_store(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote.read().clone()
    }

    /// Attaches a remote store matching the configured `remote` section.
    pub fn set_remote_store(&self, store: Arc<dyn RemoteStore>) {
        *self.remote.write() = Some(store);
    }
}

/// Rough JSON footprint estimate for the value-cache byte ceiling.
fn value_weight(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 8,
        Value::Number(_) => 16,
        Value::String(s) => 24 + s.len(),
        Value::Array(items) => 24 + items.iter().map(value_weight).sum::<usize>(),
        Value::Object(map) => {
            24 + map
                .iter()
                .map(|(k, v)| k.len() + value_weight(v))
                .sum::<usize>()
        }
    }
}

/// Asynchronous HTTP application framework instance.
pub struct App {
    router: Router,
    ctx: Arc<AppContext>,
    startup_hooks: Mutex<Vec<EventHook>>,
    shutdown_hooks: Mutex<Vec<EventHook>>,
    startup_once: tokio::sync::OnceCell<()>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl App {
    /// Builds an instance from the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let mut cache_builder: CacheBuilder<Value> = CacheBuilder::new()
            .capacity(config.cache.capacity)
            .ttl(config.cache.ttl());
        if let Some(max_bytes) = config.cache.max_memory_bytes {
            cache_builder = cache_builder.max_bytes(max_bytes).weigher(value_weight);
        }
        let cache = cache_builder.build();

        let limiter = Arc::new(TokenBucket::per_second(config.limiter.requests_per_second));
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker.failure_threshold,
            config.breaker.reset_timeout(),
        ));
        let queue = TaskQueue::new(config.queue.workers);
        let monitor = Arc::new(PerformanceMonitor::new());
        let tracer = Arc::new(Tracer::new());

        let router = Router::with_cache(2000, config.cache.ttl(), DEFAULT_HOT_THRESHOLD);
        router.plugin(CircuitBreakerPlugin::new(breaker.clone()));
        router.plugin(RateLimitPlugin::new(limiter.clone()));
        router.plugin(TelemetryPlugin::new(monitor.clone(), tracer.clone()));
        router.plugin(CompressionBuilder::new().build());

        let enable_builtin = config.api.enable_builtin_routes;
        let ctx = Arc::new(AppContext {
            config,
            cache,
            limiter,
            breaker,
            queue,
            monitor,
            tracer,
            remote: RwLock::new(None),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        });

        let app = Self {
            router,
            ctx,
            startup_hooks: Mutex::new(Vec::new()),
            shutdown_hooks: Mutex::new(Vec::new()),
            startup_once: tokio::sync::OnceCell::new(),
            background: Mutex::new(Vec::new()),
        };
        if enable_builtin {
            app.register_builtin_routes();
        }
        app
    }

    /// The router, for route and middleware registration.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The shared context handed to handlers.
    pub fn context(&self) -> Arc<AppContext> {
        self.ctx.clone()
    }

    /// Registers a lifecycle hook; hooks run in registration order.
    pub fn on_event<F, Fut>(&self, event: AppEvent, hook: F)
    where
        F: Fn(Arc<AppContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let hook: EventHook = Arc::new(move |ctx| Box::pin(hook(ctx)));
        match event {
            AppEvent::Startup => self.startup_hooks.lock().push(hook),
            AppEvent::Shutdown => self.shutdown_hooks.lock().push(hook),
        }
    }

    /// Runs startup exactly once: plugin setup, cache sweepers, queue
    /// workers, then the startup hooks. Concurrent callers wait for the
    /// first run to finish.
    pub async fn startup(&self) -> anyhow::Result<()> {
        self.startup_once
            .get_or_try_init(|| async {
                self.router.setup_plugins_once();

                let token = self.ctx.shutdown.clone();
                let sweepers = vec![
                    self.ctx.cache.spawn_sweeper(DEFAULT_SWEEP_INTERVAL, token.clone()),
                    self.router
                        .route_cache()
                        .spawn_sweeper(DEFAULT_SWEEP_INTERVAL, token.clone()),
                ];
                self.background.lock().extend(sweepers);

                self.ctx.queue.start();

                let hooks: Vec<EventHook> = self.startup_hooks.lock().clone();
                for hook in hooks {
                    hook(self.ctx.clone()).await?;
                }

                info!("application startup complete");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    /// Runs the shutdown hooks, then cancels and awaits every long-lived
    /// background task (sweepers, queue workers).
    pub async fn shutdown(&self) {
        let hooks: Vec<EventHook> = self.shutdown_hooks.lock().clone();
        for hook in hooks {
            if let Err(err) = hook(self.ctx.clone()).await {
                error!(error = %err, "shutdown hook failed");
            }
        }

        self.ctx.shutdown.cancel();
        self.ctx.queue.stop().await;
        let handles: Vec<JoinHandle<()>> = self.background.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("application shutdown complete");
    }

    /// Dispatches one request, running startup first if it has not happened
    /// yet.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        if !self.startup_once.initialized() {
            if let Err(err) = self.startup().await {
                return crate::responder::Responder::into_response(ApiError::internal(err));
            }
        }
        req.extensions_mut().insert(self.ctx.clone());
        self.router.dispatch(req).await
    }

    fn register_builtin_routes(&self) {
        let prefix = self.ctx.config.api.builtin_route_prefix.clone();

        let ctx = self.ctx.clone();
        let router = self.router.clone();
        self.router.route_tagged(
            &[Method::GET],
            &format!("/{prefix}metrics"),
            &["system"],
            move || {
                let ctx = ctx.clone();
                let router = router.clone();
                async move { metrics_payload(ctx, router) }
            },
        );

        let ctx = self.ctx.clone();
        self.router.route_tagged(
            &[Method::GET],
            &format!("/{prefix}traces"),
            &["system"],
            move || {
                let ctx = ctx.clone();
                async move { traces_payload(ctx) }
            },
        );

        let ctx = self.ctx.clone();
        self.router.route_tagged(
            &[Method::GET],
            &format!("/{prefix}health"),
            &["system"],
            move || {
                let ctx = ctx.clone();
                async move {
                    success_response(json!({
                        "status": "healthy",
                        "timestamp": epoch_seconds(),
                        "version": ctx.config.api.api_version,
                        "uptime": ctx.uptime().as_secs_f64(),
                    }))
                }
            },
        );

        let ctx = self.ctx.clone();
        let router = self.router.clone();
        self.router.route_tagged(
            &[Method::GET],
            &format!("/{prefix}info"),
            &["system"],
            move || {
                let ctx = ctx.clone();
                let router = router.clone();
                async move { info_payload(ctx, router) }
            },
        );

        if self.ctx.config.api.enable_api_docs {
            let ctx = self.ctx.clone();
            let router = self.router.clone();
            self.router.route(Method::GET, "/docs", move || {
                let ctx = ctx.clone();
                let router = router.clone();
                async move { docs_page(ctx, router) }
            });

            let ctx = self.ctx.clone();
            let router = self.router.clone();
            self.router.route(Method::GET, "/api/docs/spec", move || {
                let ctx = ctx.clone();
                let router = router.clone();
                async move { docs_spec(ctx, router) }
            });
        }
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::internal(err.into()))
}

fn metrics_payload(
    ctx: Arc<AppContext>,
    router: Router,
) -> Result<crate::response::ApiResponse<Value>, ApiError> {
    Ok(success_response(json!({
        "monitor": to_json(ctx.monitor.stats())?,
        "cache": to_json(router.route_cache().stats())?,
        "route_patterns": to_json(router.route_cache().pattern_stats())?,
        "value_cache": to_json(ctx.cache.stats())?,
    })))
}

fn traces_payload(
    ctx: Arc<AppContext>,
) -> Result<crate::response::ApiResponse<Value>, ApiError> {
    let spans: Vec<Value> = ctx
        .tracer
        .traces()
        .iter()
        .map(|span| {
            json!({
                "trace_id": span.trace_id,
                "name": span.name,
                "duration": span.duration(),
                "tags": span.tags,
                "start_time": span.start_time,
                "end_time": span.end_time,
            })
        })
        .collect();
    Ok(success_response(Value::Array(spans)))
}

fn info_payload(
    ctx: Arc<AppContext>,
    router: Router,
) -> Result<crate::response::ApiResponse<Value>, ApiError> {
    let cache = &ctx.config.cache;
    Ok(success_response(json!({
        "routes": to_json(router.routes())?,
        "middleware_count": router.middleware_count(),
        "cache_config": {
            "type": match cache.kind {
                CacheKind::Lru => "lru",
                CacheKind::Remote => "remote",
            },
            "capacity": cache.capacity,
            "ttl": cache.ttl_seconds,
        },
        "api_config": {
            "title": ctx.config.api.api_title,
            "version": ctx.config.api.api_version,
            "enable_docs": ctx.config.api.enable_api_docs,
        },
        "uptime": ctx.uptime().as_secs_f64(),
        "components": {
            "task_queue": true,
            "remote_cache": ctx.remote_store().is_some(),
        },
    })))
}

fn docs_page(ctx: Arc<AppContext>, router: Router) -> Response {
    let rows: String = router
        .routes()
        .iter()
        .map(|route| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                route.methods.join(", "),
                route.pattern,
                route.tags.join(", "),
            )
        })
        .collect();
    html_response(format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head><body>\
         <h1>{title} <small>v{version}</small></h1>\
         <table><tr><th>Methods</th><th>Path</th><th>Tags</th></tr>{rows}</table>\
         </body></html>",
        title = ctx.config.api.api_title,
        version = ctx.config.api.api_version,
    ))
}

fn docs_spec(
    ctx: Arc<AppContext>,
    router: Router,
) -> Result<crate::response::ApiResponse<Value>, ApiError> {
    Ok(success_response(json!({
        "title": ctx.config.api.api_title,
        "version": ctx.config.api.api_version,
        "routes": to_json(router.routes())?,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{body::ArborBody, extractors::context::Context, response::ApiResponse};
    use http::StatusCode;
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn get(path: &str) -> Request {
        hyper::Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(ArborBody::empty())
            .unwrap()
    }

    async fn body_env(res: Response) -> ApiResponse<Value> {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        ApiResponse::from_json(&bytes).unwrap()
    }

    #[tokio::test]
    async fn builtin_endpoints_answer() {
        let app = App::default();

        for path in ["/_health", "/_metrics", "/_traces", "/_info", "/api/docs/spec"] {
            let res = app.dispatch(get(path)).await;
            assert_eq!(res.status(), StatusCode::OK, "{path}");
            let env = body_env(res).await;
            assert_eq!(env.code, 200, "{path}");
        }

        let res = app.dispatch(get("/docs")).await;
        assert_eq!(
            res.headers()[http::header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );

        app.shutdown().await;
    }

    #[tokio::test]
    async fn builtin_prefix_is_configurable() {
        let mut config = AppConfig::default();
        config.api.builtin_route_prefix = "internal_".to_string();
        let app = App::new(config);

        assert_eq!(
            app.dispatch(get("/internal_health")).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            app.dispatch(get("/_health")).await.status(),
            StatusCode::NOT_FOUND
        );

        app.shutdown().await;
    }

    #[tokio::test]
    async fn handlers_reach_owned_components_through_context() {
        let app = App::default();
        app.router().route(Method::GET, "/cached", |ctx: Context| async move {
            ctx.cache.set("seen", json!(1), None);
            success_response(json!({ "cached": ctx.cache.get("seen") }))
        });

        let res = app.dispatch(get("/cached")).await;
        let env = body_env(res).await;
        assert_eq!(env.data.unwrap()["cached"], json!(1));

        app.shutdown().await;
    }

    #[tokio::test]
    async fn startup_hooks_run_once_before_first_request() {
        let app = App::default();
        let runs = Arc::new(AtomicU32::new(0));
        let hook_runs = runs.clone();
        app.on_event(AppEvent::Startup, move |_ctx| {
            let runs = hook_runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        app.dispatch(get("/_health")).await;
        app.dispatch(get("/_health")).await;
        app.startup().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_hooks_run_and_background_tasks_stop() {
        let app = App::default();
        let runs = Arc::new(AtomicU32::new(0));
        let hook_runs = runs.clone();
        app.on_event(AppEvent::Shutdown, move |_ctx| {
            let runs = hook_runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        app.startup().await.unwrap();
        app.shutdown().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
