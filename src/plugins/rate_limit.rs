//! Token-bucket admission gate.
//!
//! Installed ahead of the handlers, the middleware takes one token per
//! request and answers a 429 envelope without waiting when the bucket is
//! empty.

use std::sync::Arc;

use anyhow::Result;

use crate::{
    errors::ApiError,
    limiter::TokenBucket,
    plugins::ArborPlugin,
    responder::Responder,
    router::Router,
};

/// Rate limiting plugin backed by a shared token bucket.
#[derive(Clone)]
pub struct RateLimitPlugin {
    bucket: Arc<TokenBucket>,
}

impl RateLimitPlugin {
    /// Wraps an existing bucket, usually the one owned by the framework
    /// instance.
    pub fn new(bucket: Arc<TokenBucket>) -> Self {
        Self { bucket }
    }

    /// Standalone plugin admitting `requests_per_second`.
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(Arc::new(TokenBucket::per_second(requests_per_second)))
    }
}

impl ArborPlugin for RateLimitPlugin {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn setup(&self, router: &Router) -> Result<()> {
        let bucket = self.bucket.clone();
        router.middleware(move |req, next| {
            let bucket = bucket.clone();
            async move {
                if bucket.try_acquire() {
                    next.run(req).await
                } else {
                    ApiError::RateLimited.into_response()
                }
            }
        });
        Ok(())
    }
}
