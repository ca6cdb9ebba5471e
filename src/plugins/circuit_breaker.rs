//! Circuit-breaker admission gate.
//!
//! The middleware asks the breaker for admission before running the rest of
//! the chain and reports the outcome afterwards; any response with status
//! >= 500 counts as a failure. Rejected requests answer a 503 envelope.

use std::sync::Arc;

use anyhow::Result;

use crate::{
    breaker::CircuitBreaker,
    errors::ApiError,
    plugins::ArborPlugin,
    responder::Responder,
    router::Router,
};

/// Circuit breaking plugin backed by a shared breaker.
#[derive(Clone)]
pub struct CircuitBreakerPlugin {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerPlugin {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl ArborPlugin for CircuitBreakerPlugin {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn setup(&self, router: &Router) -> Result<()> {
        let breaker = self.breaker.clone();
        router.middleware(move |req, next| {
            let breaker = breaker.clone();
            async move {
                if !breaker.try_acquire() {
                    return ApiError::CircuitOpen.into_response();
                }
                let res = next.run(req).await;
                breaker.record(res.status().as_u16() < 500);
                res
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::ArborBody, breaker::CircuitState, errors::ApiError, types::Request,
    };
    use http::{Method, StatusCode};
    use std::time::Duration;

    fn get() -> Request {
        hyper::Request::builder()
            .method(Method::GET)
            .uri("/flaky")
            .body(ArborBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn opens_after_consecutive_failures_and_rejects() {
        let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(60)));
        let router = Router::new();
        router.plugin(CircuitBreakerPlugin::new(breaker.clone()));
        router.setup_plugins_once();
        router.route(Method::GET, "/flaky", || async {
            Err::<&'static str, _>(ApiError::internal_msg("boom"))
        });

        for _ in 0..3 {
            let res = router.dispatch(get()).await;
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let res = router.dispatch(get()).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
