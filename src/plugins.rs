//! Plugin system for framework extensions.
//!
//! A plugin packages a cross-cutting concern (compression, admission
//! control, telemetry) as a reusable unit that installs middleware on the
//! router during startup. The framework instance registers its default
//! stack through this mechanism; applications can add their own.

use anyhow::Result;

use crate::router::Router;

/// Failure-driven admission gating.
pub mod circuit_breaker;

/// Gzip response compression with memoized payloads.
pub mod compression;

/// Token-bucket admission control.
pub mod rate_limit;

/// Request metrics and span recording.
pub mod telemetry;

/// Trait implemented by framework plugins.
pub trait ArborPlugin: Send + Sync + 'static {
    /// Unique name, used in logs.
    fn name(&self) -> &'static str;

    /// Installs the plugin on the router. Runs once at startup.
    fn setup(&self, router: &Router) -> Result<()>;
}
