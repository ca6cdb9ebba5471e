//! Framework configuration.
//!
//! Plain serde-deserializable structs with defaults for every option, so a
//! config file only needs to spell out what it changes. Environment
//! variables override the defaults through [`AppConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backing store for the value cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Lru,
    Remote,
}

/// Connection settings for a remote key/value store.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteCacheConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl RemoteCacheConfig {
    /// Connection URL in the form `remote://[:pwd@]host:port/db`.
    pub fn url(&self) -> String {
        let auth = self
            .password
            .as_deref()
            .map(|pwd| format!(":{pwd}@"))
            .unwrap_or_default();
        format!("remote://{auth}{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Value-cache settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    pub kind: CacheKind,
    pub capacity: usize,
    pub ttl_seconds: u64,
    pub max_memory_bytes: Option<usize>,
    pub remote: RemoteCacheConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Lru,
            capacity: 1000,
            ttl_seconds: 3600,
            max_memory_bytes: None,
            remote: RemoteCacheConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Token-bucket limiter settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub requests_per_second: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1000,
        }
    }
}

/// Circuit-breaker settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_seconds: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_seconds: 60,
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_seconds)
    }
}

/// Task-queue settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { workers: 3 }
    }
}

/// Builtin-route and docs settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enable_builtin_routes: bool,
    pub builtin_route_prefix: String,
    pub enable_api_docs: bool,
    pub api_title: String,
    pub api_version: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_builtin_routes: true,
            builtin_route_prefix: "_".to_string(),
            enable_api_docs: true,
            api_title: "API Documentation".to_string(),
            api_version: "1.0.0".to_string(),
        }
    }
}

/// Top-level framework configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub limiter: LimiterConfig,
    pub breaker: BreakerConfig,
    pub queue: QueueConfig,
    pub api: ApiConfig,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl AppConfig {
    /// Builds a configuration from environment variables, falling back to
    /// the defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(kind) = std::env::var("CACHE_TYPE") {
            if kind.eq_ignore_ascii_case("remote") {
                config.cache.kind = CacheKind::Remote;
            }
        }
        if let Some(capacity) = env_parse("CACHE_CAPACITY") {
            config.cache.capacity = capacity;
        }
        if let Some(ttl) = env_parse("CACHE_TTL") {
            config.cache.ttl_seconds = ttl;
        }
        if let Some(max_bytes) = env_parse("CACHE_MAX_MEMORY_BYTES") {
            config.cache.max_memory_bytes = Some(max_bytes);
        }
        if let Ok(host) = std::env::var("REMOTE_CACHE_HOST") {
            config.cache.remote.host = host;
        }
        if let Some(port) = env_parse("REMOTE_CACHE_PORT") {
            config.cache.remote.port = port;
        }
        if let Ok(password) = std::env::var("REMOTE_CACHE_PASSWORD") {
            config.cache.remote.password = Some(password);
        }
        if let Some(db) = env_parse("REMOTE_CACHE_DB") {
            config.cache.remote.db = db;
        }
        if let Some(rps) = env_parse("RATE_LIMIT_PER_SECOND") {
            config.limiter.requests_per_second = rps;
        }
        if let Some(threshold) = env_parse("BREAKER_FAILURE_THRESHOLD") {
            config.breaker.failure_threshold = threshold;
        }
        if let Some(timeout) = env_parse("BREAKER_RESET_TIMEOUT") {
            config.breaker.reset_timeout_seconds = timeout;
        }
        if let Some(workers) = env_parse("TASK_QUEUE_WORKERS") {
            config.queue.workers = workers;
        }

        config
    }
}
