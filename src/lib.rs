//! An asynchronous HTTP application framework with routing, caching, and
//! resilience controls built in.
//!
//! Arbor dispatches requests through a user-extensible middleware chain to
//! handlers selected from a trie-based router, and answers with a canonical
//! JSON envelope. The framework instance owns the operational machinery a
//! service needs around its handlers:
//!
//! - a trie router with static, parameterized, and wildcard segments,
//!   fronted by a hot-route-aware resolution cache,
//! - an LRU + TTL value cache with eviction, byte ceilings, and background
//!   expiry sweeping,
//! - a token-bucket rate limiter and a three-state circuit breaker gating
//!   every request,
//! - a priority task queue with retrying consumers for background work,
//! - request metrics and span recording, exposed through builtin
//!   introspection endpoints (`/_metrics`, `/_traces`, `/_health`,
//!   `/_info`).
//!
//! # Compatibility
//! - Runtime: `tokio`
//! - HTTP: `hyper` 1.x
//!
//! # Quickstart
//!
//! ```rust,no_run
//! use arbor::{App, Method, response::success_response, serve};
//! use tokio::net::TcpListener;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let app = App::default();
//! app.router().route(Method::GET, "/users/{id}", || async {
//!     success_response(serde_json::json!({ "name": "ada" }))
//! });
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! serve(listener, app).await;
//! # Ok(())
//! # }
//! ```
//!
//! # Key concepts
//! - [`App`] owns the components and wires the default middleware stack.
//! - [`router::Router`] stores routes and dispatches requests.
//! - [`extractors`] parse request data into typed handler arguments.
//! - [`responder::Responder`] converts return values into HTTP responses.
//! - [`response::ApiResponse`] is the canonical envelope
//!   `{ code, message, data, timestamp }`.

/// Framework instance owning the subsystems and their lifecycle.
pub mod app;

/// HTTP body wrapper with chunked-replay support.
pub mod body;

/// Three-state circuit breaker.
pub mod breaker;

/// LRU + TTL cache and the remote-store interface.
pub mod cache;

/// Configuration structs with defaults and env overrides.
pub mod config;

/// Error taxonomy rendered through the response envelope.
pub mod errors;

/// Request data extraction into typed handler arguments.
pub mod extractors;

/// Handler traits and type erasure.
pub mod handler;

/// Token-bucket rate limiter.
pub mod limiter;

/// Request metrics aggregation.
pub mod metrics;

/// Middleware chain execution.
pub mod middleware;

/// Plugin system and the built-in plugins.
pub mod plugins;

/// Background task queue.
pub mod queue;

/// Response envelope and helpers.
pub mod response;

/// Conversion of handler return values into responses.
pub mod responder;

/// Registered route metadata.
pub mod route;

/// Route-resolution cache with hot-route protection.
pub mod route_cache;

/// Request routing and dispatch.
pub mod router;

/// HTTP server loop.
mod server;

/// Per-request span recording.
pub mod tracer;

/// Structured logging setup.
pub mod tracing;

/// Route storage as a trie keyed by path segments.
mod trie;

/// Core type aliases.
pub mod types;

pub use app::{App, AppContext, AppEvent};
pub use bytes::Bytes;
pub use errors::ApiError;
pub use http::{Method, StatusCode, header};
pub use response::{ApiResponse, error_response, success_response};
pub use server::serve;
