//! Core type aliases shared across the framework.
//!
//! These aliases pin down the request/response types used by handlers,
//! middleware, and plugins so the rest of the crate never spells out the
//! underlying hyper generics. A [`Request`] carries an [`ArborBody`] so the
//! same type flows through the live server and through tests that build
//! requests by hand.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::Method;
use smallvec::SmallVec;

use crate::{body::ArborBody, middleware::Next};

/// HTTP request type processed by routers, middleware, and handlers.
pub type Request = hyper::Request<ArborBody>;

/// HTTP response type produced by handlers and middleware.
pub type Response = hyper::Response<ArborBody>;

/// Set of HTTP methods a route answers to.
///
/// Routes rarely accept more than a couple of methods, so the set lives
/// inline without allocating.
pub type MethodSet = SmallVec<[Method; 4]>;

/// Boxed HTTP body combining byte frames with boxed errors.
pub(crate) type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Boxed error type used for body and connection plumbing.
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased middleware function.
///
/// A middleware receives the request and the remainder of the chain as a
/// [`Next`] value; running `next` continues toward the terminal handler,
/// returning early produces a response without invoking the inner layers.
pub type BoxMiddleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;
