//! Middleware chain execution.
//!
//! A middleware wraps the rest of the request pipeline: code before its
//! `next.run(req)` call is the before phase, code after it is the after
//! phase. [`Next`] is a cursor over one shared snapshot of the chain: each
//! `run` hands the request to the layer under the cursor together with the
//! advanced cursor, so the first-registered middleware runs its before
//! phase first and its after phase last, and no per-step copies of the
//! chain are made. Returning a response without calling `next`
//! short-circuits the remaining layers and the handler while the after
//! phases of the already-entered outer middlewares still run.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::types::{BoxMiddleware, Request, Response};

/// Type-erased terminal endpoint of a middleware chain.
pub(crate) type BoxEndpoint = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Cursor into the remainder of the middleware chain.
pub struct Next {
    chain: Arc<Vec<BoxMiddleware>>,
    position: usize,
    endpoint: BoxEndpoint,
}

impl Next {
    pub(crate) fn new(chain: Arc<Vec<BoxMiddleware>>, endpoint: BoxEndpoint) -> Self {
        Self {
            chain,
            position: 0,
            endpoint,
        }
    }

    /// Runs the layer under the cursor, or the endpoint once the chain is
    /// exhausted.
    pub async fn run(mut self, req: Request) -> Response {
        match self.chain.get(self.position).cloned() {
            Some(layer) => {
                self.position += 1;
                layer(req, self).await
            }
            None => (self.endpoint)(req).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::ArborBody;
    use parking_lot::Mutex;

    fn recording_middleware(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> BoxMiddleware {
        Arc::new(move |req, next| {
            let log = log.clone();
            Box::pin(async move {
                log.lock().push(format!("{name}:before"));
                let res = next.run(req).await;
                log.lock().push(format!("{name}:after"));
                res
            })
        })
    }

    fn request() -> Request {
        hyper::Request::builder()
            .uri("/")
            .body(ArborBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn before_in_order_after_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = vec![
            recording_middleware(log.clone(), "m1"),
            recording_middleware(log.clone(), "m2"),
            recording_middleware(log.clone(), "m3"),
        ];
        let endpoint_log = log.clone();
        let endpoint: BoxEndpoint = Arc::new(move |_req| {
            let log = endpoint_log.clone();
            Box::pin(async move {
                log.lock().push("handler".to_string());
                hyper::Response::new(ArborBody::empty())
            })
        });

        Next::new(Arc::new(chain), endpoint).run(request()).await;

        assert_eq!(
            *log.lock(),
            vec![
                "m1:before", "m2:before", "m3:before", "handler", "m3:after", "m2:after",
                "m1:after",
            ]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_layers_but_outer_after_runs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reject_log = log.clone();
        let rejecting: BoxMiddleware = Arc::new(move |_req, _next| {
            let log = reject_log.clone();
            Box::pin(async move {
                log.lock().push("reject".to_string());
                let mut res = hyper::Response::new(ArborBody::empty());
                *res.status_mut() = http::StatusCode::TOO_MANY_REQUESTS;
                res
            })
        });
        let chain = vec![
            recording_middleware(log.clone(), "outer"),
            rejecting,
            recording_middleware(log.clone(), "inner"),
        ];
        let endpoint_log = log.clone();
        let endpoint: BoxEndpoint = Arc::new(move |_req| {
            let log = endpoint_log.clone();
            Box::pin(async move {
                log.lock().push("handler".to_string());
                hyper::Response::new(ArborBody::empty())
            })
        });

        let res = Next::new(Arc::new(chain), endpoint).run(request()).await;

        assert_eq!(res.status(), http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(*log.lock(), vec!["outer:before", "reject", "outer:after"]);
    }

    #[tokio::test]
    async fn empty_chain_goes_straight_to_endpoint() {
        let endpoint: BoxEndpoint = Arc::new(|_req| {
            Box::pin(async {
                let mut res = hyper::Response::new(ArborBody::empty());
                *res.status_mut() = http::StatusCode::NO_CONTENT;
                res
            })
        });

        let res = Next::new(Arc::new(Vec::new()), endpoint).run(request()).await;
        assert_eq!(res.status(), http::StatusCode::NO_CONTENT);
    }
}
