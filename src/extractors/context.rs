//! Application-context extraction.
//!
//! The framework instance inserts its context into every request before
//! dispatch; handlers declare a `Context` argument to reach the owned
//! components (value cache, task queue, limiter, breaker, telemetry,
//! configuration).

use std::{future::ready, sync::Arc};

use crate::{app::AppContext, errors::ApiError, extractors::FromRequest, types::Request};

/// Handle to the framework instance's context.
#[derive(Clone)]
pub struct Context(pub Arc<AppContext>);

impl std::ops::Deref for Context {
    type Target = AppContext;

    fn deref(&self) -> &AppContext {
        &self.0
    }
}

impl FromRequest for Context {
    type Error = ApiError;

    fn from_request(
        req: &mut Request,
    ) -> impl core::future::Future<Output = core::result::Result<Self, Self::Error>> + Send {
        let ctx = req
            .extensions()
            .get::<Arc<AppContext>>()
            .cloned()
            .map(Context)
            .ok_or_else(|| ApiError::internal_msg("request has no application context"));
        ready(ctx)
    }
}
