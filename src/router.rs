//! Request routing and dispatch.
//!
//! The router owns the route trie and its resolution cache, the global
//! middleware chain, and the registered plugins. Dispatch runs the compiled
//! middleware chain around a terminal core that resolves the route
//! (cache first, trie on miss), checks the method set, injects the captured
//! parameters, and invokes the handler. Missing routes and method
//! mismatches answer with a 404 envelope; a panicking handler is contained
//! and answered with an internal-error envelope.
//!
//! The chain snapshot is rebuilt whenever middleware is registered, so the
//! per-request cost is a single atomic load.

use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use hyper::Method;
use parking_lot::RwLock;

use crate::{
    errors::ApiError,
    extractors::params::PathParams,
    handler::{BoxHandler, Handler},
    middleware::{BoxEndpoint, Next},
    plugins::ArborPlugin,
    responder::Responder,
    route::Route,
    route_cache::{DEFAULT_HOT_THRESHOLD, RouteCache},
    trie::{RouteTrie, method_set},
    types::{BoxMiddleware, MethodSet, Request, Response},
};

struct RouterInner {
    trie: RwLock<RouteTrie>,
    routes: RwLock<Vec<Route>>,
    route_cache: RouteCache,
    middlewares: RwLock<Vec<BoxMiddleware>>,
    chain: ArcSwap<Vec<BoxMiddleware>>,
    plugins: RwLock<Vec<Box<dyn ArborPlugin>>>,
    plugins_initialized: AtomicBool,
}

/// HTTP router; cloning yields another handle to the same instance.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a router with the default route-cache sizing.
    pub fn new() -> Self {
        Self::with_cache(2000, Duration::from_secs(3600), DEFAULT_HOT_THRESHOLD)
    }

    /// Creates a router with explicit route-cache sizing.
    pub fn with_cache(capacity: usize, ttl: Duration, hot_threshold: u64) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                trie: RwLock::new(RouteTrie::new()),
                routes: RwLock::new(Vec::new()),
                route_cache: RouteCache::new(capacity, ttl, hot_threshold),
                middlewares: RwLock::new(Vec::new()),
                chain: ArcSwap::from_pointee(Vec::new()),
                plugins: RwLock::new(Vec::new()),
                plugins_initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a route for a single method.
    pub fn route<H, T>(&self, method: Method, pattern: &str, handler: H)
    where
        H: Handler<T>,
    {
        self.route_tagged(&[method], pattern, &[], handler);
    }

    /// Registers a route answering to several methods.
    pub fn route_with_methods<H, T>(&self, methods: &[Method], pattern: &str, handler: H)
    where
        H: Handler<T>,
    {
        self.route_tagged(methods, pattern, &[], handler);
    }

    /// Registers a route with methods and documentation tags.
    ///
    /// # Panics
    ///
    /// Panics on a malformed pattern (empty `{}` parameter, interior
    /// wildcard).
    pub fn route_tagged<H, T>(&self, methods: &[Method], pattern: &str, tags: &[&str], handler: H)
    where
        H: Handler<T>,
    {
        let methods: MethodSet = method_set(methods);
        self.inner
            .routes
            .write()
            .push(Route::new(pattern, &methods, tags));
        self.inner
            .trie
            .write()
            .insert(pattern, methods, BoxHandler::from_handler(handler));
    }

    /// Adds global middleware; it wraps every subsequent dispatch.
    ///
    /// Middlewares run in registration order on the way in and in reverse
    /// order on the way out.
    pub fn middleware<F, Fut, R>(&self, f: F) -> &Self
    where
        F: Fn(Request, Next) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = R> + Send + 'static,
        R: Responder + Send + 'static,
    {
        let mw: BoxMiddleware = Arc::new(move |req, next| {
            let fut = f(req, next);
            Box::pin(async move { fut.await.into_response() })
        });

        let mut middlewares = self.inner.middlewares.write();
        middlewares.push(mw);
        // Refresh the compiled-chain snapshot; dispatch only does an
        // atomic load.
        self.inner.chain.store(Arc::new(middlewares.clone()));
        self
    }

    /// Registers a plugin; its `setup` runs once at startup.
    pub fn plugin<P>(&self, plugin: P) -> &Self
    where
        P: ArborPlugin + 'static,
    {
        self.inner.plugins.write().push(Box::new(plugin));
        self
    }

    /// Runs every registered plugin's setup exactly once.
    pub fn setup_plugins_once(&self) {
        if !self.inner.plugins_initialized.swap(true, Ordering::SeqCst) {
            for plugin in self.inner.plugins.read().iter() {
                if let Err(err) = plugin.setup(self) {
                    tracing::warn!(plugin = plugin.name(), error = %err, "plugin setup failed");
                }
            }
        }
    }

    /// Snapshot of the registered routes.
    pub fn routes(&self) -> Vec<Route> {
        self.inner.routes.read().clone()
    }

    /// The route-resolution cache, for stats and sweeping.
    pub fn route_cache(&self) -> &RouteCache {
        &self.inner.route_cache
    }

    /// Number of registered global middlewares.
    pub fn middleware_count(&self) -> usize {
        self.inner.middlewares.read().len()
    }

    /// Dispatches a request through the middleware chain to its handler.
    ///
    /// Anything escaping the chain is contained and answered with an
    /// internal-error envelope, so one bad request never takes the
    /// connection down.
    pub async fn dispatch(&self, req: Request) -> Response {
        let chain = self.inner.chain.load_full();
        let inner = self.inner.clone();
        let endpoint: BoxEndpoint = Arc::new(move |req| {
            let inner = inner.clone();
            Box::pin(async move { handle_request(inner, req).await })
        });

        let run = Next::new(chain, endpoint).run(req);
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                ApiError::internal_msg(format!("middleware panicked: {}", panic_message(&panic)))
                    .into_response()
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Terminal core of the middleware chain: resolution, binding, invocation.
async fn handle_request(inner: Arc<RouterInner>, mut req: Request) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    let matched = {
        let trie = inner.trie.read();
        inner.route_cache.resolve(&path, |p| trie.lookup(p))
    };

    let Some(matched) = matched else {
        return ApiError::NotFound.into_response();
    };
    // Method mismatches answer 404, matching the original wire behavior.
    if !matched.methods.contains(&method) {
        return ApiError::NotFound.into_response();
    }

    if !matched.params.is_empty() {
        req.extensions_mut()
            .insert(PathParams(matched.params.clone()));
    }

    // Containment at the handler keeps the outer middlewares' after phases
    // running on the error path.
    match AssertUnwindSafe(matched.handler.call(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            ApiError::internal_msg(format!("handler panicked: {}", panic_message(&panic)))
                .into_response()
        }
    }
}
