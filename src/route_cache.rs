//! Memoization layer over trie lookups.
//!
//! Resolved routes are cached per concrete path under a `route:`-prefixed
//! key, so repeated requests skip the trie walk entirely. Paths accessed
//! more often than the hot threshold join a hot-route set that the TTL
//! sweeper leaves alone; hot entries still fall to LRU eviction under
//! capacity pressure. Pattern-level hit counts and trie-resolution
//! latencies are recorded for the introspection endpoints.

use std::{collections::HashMap, sync::Arc, time::{Duration, Instant}};

use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::{CacheBuilder, CacheStats, LruCache},
    trie::TrieMatch,
};

/// Access count at which a path becomes a hot route.
pub const DEFAULT_HOT_THRESHOLD: u64 = 1000;

/// Pattern-level statistics for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct PatternStats {
    /// Top patterns by hits, most popular first (at most ten).
    pub popular_patterns: Vec<(String, u64)>,
    /// Average trie-resolution latency per pattern, in milliseconds.
    pub pattern_latencies: HashMap<String, f64>,
}

/// Caches resolved routes and protects hot paths from TTL expiry.
pub struct RouteCache {
    cache: LruCache<Arc<TrieMatch>>,
    access_counts: DashMap<String, u64>,
    hot_routes: Arc<DashSet<String>>,
    hot_threshold: u64,
    pattern_hits: DashMap<String, u64>,
    pattern_latency: DashMap<String, (f64, u64)>,
}

impl RouteCache {
    pub fn new(capacity: usize, ttl: Duration, hot_threshold: u64) -> Self {
        Self {
            cache: CacheBuilder::new().capacity(capacity).ttl(ttl).build(),
            access_counts: DashMap::new(),
            hot_routes: Arc::new(DashSet::new()),
            hot_threshold: hot_threshold.max(1),
            pattern_hits: DashMap::new(),
            pattern_latency: DashMap::new(),
        }
    }

    /// Resolves `path`, consulting the cache before falling back to `lookup`.
    pub(crate) fn resolve(
        &self,
        path: &str,
        lookup: impl FnOnce(&str) -> Option<TrieMatch>,
    ) -> Option<Arc<TrieMatch>> {
        let key = format!("route:{path}");

        let accesses = {
            let mut count = self.access_counts.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if accesses >= self.hot_threshold {
            self.hot_routes.insert(key.clone());
        }

        if let Some(found) = self.cache.get(&key) {
            *self.pattern_hits.entry(found.pattern.clone()).or_insert(0) += 1;
            return Some(found);
        }

        let started = Instant::now();
        let matched = Arc::new(lookup(path)?);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        *self
            .pattern_hits
            .entry(matched.pattern.clone())
            .or_insert(0) += 1;
        let mut latency = self
            .pattern_latency
            .entry(matched.pattern.clone())
            .or_insert((0.0, 0));
        latency.0 += elapsed_ms;
        latency.1 += 1;
        drop(latency);

        self.cache.set(key, matched.clone(), None);
        Some(matched)
    }

    /// Whether the path belongs to the hot-route set.
    pub fn is_hot(&self, path: &str) -> bool {
        self.hot_routes.contains(&format!("route:{path}"))
    }

    /// Underlying cache counters.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Pattern popularity and resolution latencies.
    pub fn pattern_stats(&self) -> PatternStats {
        let mut popular: Vec<(String, u64)> = self
            .pattern_hits
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        popular.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        popular.truncate(10);

        let pattern_latencies = self
            .pattern_latency
            .iter()
            .map(|entry| {
                let (total, count) = *entry.value();
                (entry.key().clone(), total / count.max(1) as f64)
            })
            .collect();

        PatternStats {
            popular_patterns: popular,
            pattern_latencies,
        }
    }

    /// Spawns the TTL sweeper; hot routes are skipped until capacity
    /// pressure evicts them through the LRU policy.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let hot = self.hot_routes.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        cache.sweep_expired(|key| hot.contains(key));
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{handler::BoxHandler, trie::method_set, types::Request};
    use hyper::Method;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn trie_match(pattern: &str) -> TrieMatch {
        TrieMatch {
            handler: BoxHandler::from_handler(|_req: Request| async { "ok" }),
            methods: method_set(&[Method::GET]),
            params: HashMap::new(),
            pattern: pattern.to_string(),
        }
    }

    #[test]
    fn second_resolution_hits_the_cache() {
        let cache = RouteCache::new(16, Duration::from_secs(60), DEFAULT_HOT_THRESHOLD);
        let lookups = AtomicU32::new(0);

        for _ in 0..2 {
            let found = cache.resolve("/health", |_| {
                lookups.fetch_add(1, Ordering::SeqCst);
                Some(trie_match("health"))
            });
            assert!(found.is_some());
        }

        assert_eq!(lookups.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn miss_is_not_cached() {
        let cache = RouteCache::new(16, Duration::from_secs(60), DEFAULT_HOT_THRESHOLD);
        assert!(cache.resolve("/nope", |_| None).is_none());
        assert!(cache.resolve("/nope", |_| None).is_none());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn hot_route_promotion_after_threshold() {
        let cache = RouteCache::new(16, Duration::from_secs(60), 3);
        for _ in 0..3 {
            cache.resolve("/busy", |_| Some(trie_match("busy")));
        }
        assert!(cache.is_hot("/busy"));
        assert!(!cache.is_hot("/idle"));
    }

    #[test]
    fn pattern_stats_track_hits_and_latency() {
        let cache = RouteCache::new(16, Duration::from_secs(60), DEFAULT_HOT_THRESHOLD);
        for _ in 0..3 {
            cache.resolve("/users/1", |_| Some(trie_match("users/*")));
        }
        cache.resolve("/health", |_| Some(trie_match("health")));

        let stats = cache.pattern_stats();
        assert_eq!(stats.popular_patterns[0], ("users/*".to_string(), 3));
        assert!(stats.pattern_latencies.contains_key("users/*"));
    }
}
