//! Bounded in-memory cache with LRU eviction and per-entry TTL.
//!
//! [`LruCache`] is the storage primitive behind the route-resolution cache,
//! the response-payload memoization, and the general-purpose value cache
//! handlers reach through the application context. Entries carry a creation
//! timestamp, an optional expiry, and an access counter; recency is tracked
//! by the backing LRU container so eviction always removes the
//! least-recently-used entry first. An optional byte ceiling evicts further
//! entries once the estimated footprint (per a caller-supplied weigher)
//! exceeds the limit.
//!
//! All operations take one cache-wide mutex for a short critical section and
//! never hold it across an await. Expired entries are dropped lazily on
//! `get` and eagerly by a background sweeper spawned per cache.

use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default interval between sweeper passes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expire_at: Option<Instant>,
    access_count: u64,
}

struct CacheInner<V> {
    entries: lru::LruCache<String, CacheEntry<V>>,
    estimated_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Shared LRU cache with TTL support.
///
/// Cloning is cheap and yields another handle to the same cache.
pub struct LruCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
    capacity: usize,
    default_ttl: Option<Duration>,
    max_bytes: Option<usize>,
    weigher: Option<Arc<dyn Fn(&V) -> usize + Send + Sync>>,
}

impl<V> Clone for LruCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            capacity: self.capacity,
            default_ttl: self.default_ttl,
            max_bytes: self.max_bytes,
            weigher: self.weigher.clone(),
        }
    }
}

/// Builder for [`LruCache`] instances.
pub struct CacheBuilder<V> {
    capacity: usize,
    default_ttl: Option<Duration>,
    max_bytes: Option<usize>,
    weigher: Option<Arc<dyn Fn(&V) -> usize + Send + Sync>>,
}

impl<V> CacheBuilder<V> {
    pub fn new() -> Self {
        Self {
            capacity: 1000,
            default_ttl: Some(Duration::from_secs(3600)),
            max_bytes: None,
            weigher: None,
        }
    }

    /// Maximum number of entries; the least-recently-used entry is evicted
    /// once the cache is full.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Default time-to-live applied when `set` is called without one.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Entries never expire unless `set` is given an explicit TTL.
    pub fn no_default_ttl(mut self) -> Self {
        self.default_ttl = None;
        self
    }

    /// Byte ceiling; LRU entries are evicted while the estimated footprint
    /// exceeds it. Requires a weigher.
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Function estimating the byte footprint of a value.
    pub fn weigher(mut self, weigher: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        self.weigher = Some(Arc::new(weigher));
        self
    }

    pub fn build(self) -> LruCache<V> {
        let capacity = NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN);
        LruCache {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: lru::LruCache::new(capacity),
                estimated_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            })),
            capacity: capacity.get(),
            default_ttl: self.default_ttl,
            max_bytes: self.max_bytes,
            weigher: self.weigher,
        }
    }
}

impl<V> Default for CacheBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + 'static> LruCache<V> {
    /// Creates a cache with the given capacity and default TTL.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        CacheBuilder::new().capacity(capacity).ttl(ttl).build()
    }

    /// Returns the cached value, marking it recently used.
    ///
    /// An absent or expired entry counts as a miss; expired entries are
    /// removed on the spot.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let expired = match inner.entries.get_mut(key) {
            None => {
                inner.misses += 1;
                debug!(key, "cache miss");
                return None;
            }
            Some(entry) => {
                if entry.expire_at.is_some_and(|at| now > at) {
                    true
                } else {
                    entry.access_count += 1;
                    debug!(
                        key,
                        accesses = entry.access_count,
                        age_ms = entry.created_at.elapsed().as_millis() as u64,
                        "cache hit"
                    );
                    inner.hits += 1;
                    return Some(entry.value.clone());
                }
            }
        };

        if expired {
            if let Some(entry) = inner.entries.pop(key) {
                inner.estimated_bytes = inner
                    .estimated_bytes
                    .saturating_sub(self.weight(&entry.value));
            }
            debug!(key, "cache entry expired");
        }
        inner.misses += 1;
        None
    }

    /// Inserts or updates an entry, enforcing capacity and the byte ceiling.
    ///
    /// `ttl` overrides the cache default; `None` falls back to it.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = Instant::now();
        let expire_at = ttl.or(self.default_ttl).map(|d| now + d);
        let weight = self.weight(&value);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let entry = CacheEntry {
            value,
            created_at: now,
            expire_at,
            access_count: 0,
        };
        inner.estimated_bytes += weight;
        if let Some((old_key, old_entry)) = inner.entries.push(key.clone(), entry) {
            inner.estimated_bytes = inner
                .estimated_bytes
                .saturating_sub(self.weight(&old_entry.value));
            if old_key != key {
                inner.evictions += 1;
            }
        }

        if let Some(max_bytes) = self.max_bytes {
            while inner.estimated_bytes > max_bytes && inner.entries.len() > 1 {
                if let Some((_, evicted)) = inner.entries.pop_lru() {
                    inner.estimated_bytes = inner
                        .estimated_bytes
                        .saturating_sub(self.weight(&evicted.value));
                    inner.evictions += 1;
                } else {
                    break;
                }
            }
        }
    }

    /// Removes an entry, returning its value if present.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.entries.pop(key).map(|entry| {
            inner.estimated_bytes = inner
                .estimated_bytes
                .saturating_sub(self.weight(&entry.value));
            entry.value
        })
    }

    /// Removes all entries. Counters are preserved.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        guard.entries.clear();
        guard.estimated_bytes = 0;
    }

    /// Number of live entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Estimated byte footprint per the configured weigher.
    pub fn estimated_bytes(&self) -> usize {
        self.inner.lock().estimated_bytes
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock();
        let lookups = guard.hits + guard.misses;
        CacheStats {
            hits: guard.hits,
            misses: guard.misses,
            evictions: guard.evictions,
            size: guard.entries.len(),
            capacity: self.capacity,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                guard.hits as f64 / lookups as f64
            },
        }
    }

    /// Removes expired entries, skipping keys the predicate protects.
    ///
    /// Keys are collected under the lock and removed in a second short
    /// critical section, so concurrent `get`/`set` calls are never blocked
    /// for long.
    pub fn sweep_expired(&self, protect: impl Fn(&str) -> bool) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = {
            let guard = self.inner.lock();
            guard
                .entries
                .iter()
                .filter(|(key, entry)| {
                    entry.expire_at.is_some_and(|at| now > at) && !protect(key.as_str())
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        let removed = expired.len();
        if removed > 0 {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            for key in expired {
                if let Some(entry) = inner.entries.pop(&key) {
                    inner.estimated_bytes = inner
                        .estimated_bytes
                        .saturating_sub(self.weight(&entry.value));
                }
            }
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Spawns the background sweeper; it stops when the token is cancelled.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        cache.sweep_expired(|_| false);
                    }
                }
            }
        })
    }

    fn weight(&self, value: &V) -> usize {
        match &self.weigher {
            Some(weigher) => weigher(value),
            None => std::mem::size_of::<V>(),
        }
    }
}

/// Interface to an external key/value store used as an optional remote
/// cache. The framework only consumes this surface; connecting to an actual
/// backend is up to the embedding application.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache: LruCache<u32> = CacheBuilder::new().capacity(2).build();
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        assert_eq!(cache.get("a"), Some(1)); // refresh "a"
        cache.set("c", 3, None);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.len() <= 2);
    }

    #[test]
    fn expired_entries_are_missed_and_removed() {
        let cache: LruCache<u32> = CacheBuilder::new().capacity(8).build();
        cache.set("short", 1, Some(Duration::from_millis(20)));
        assert_eq!(cache.get("short"), Some(1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lookup_counters_add_up() {
        let cache: LruCache<u32> = CacheBuilder::new().capacity(8).build();
        cache.set("k", 7, None);
        let _ = cache.get("k");
        let _ = cache.get("k");
        let _ = cache.get("absent");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits + stats.misses, 3);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn byte_ceiling_evicts_until_under_limit() {
        let cache: LruCache<Vec<u8>> = CacheBuilder::new()
            .capacity(100)
            .max_bytes(1024)
            .weigher(|v: &Vec<u8>| v.len())
            .build();

        for i in 0..10 {
            cache.set(format!("k{i}"), vec![0u8; 200], None);
        }

        assert!(cache.estimated_bytes() <= 1024);
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn replacement_is_not_an_eviction() {
        let cache: LruCache<u32> = CacheBuilder::new().capacity(4).build();
        cache.set("k", 1, None);
        cache.set("k", 2, None);

        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache: LruCache<u32> = CacheBuilder::new().capacity(4).build();
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.estimated_bytes(), 0);
    }

    #[test]
    fn sweep_removes_expired_but_keeps_protected() {
        let cache: LruCache<u32> = CacheBuilder::new().capacity(8).build();
        cache.set("hot", 1, Some(Duration::from_millis(10)));
        cache.set("cold", 2, Some(Duration::from_millis(10)));
        cache.set("fresh", 3, Some(Duration::from_secs(60)));

        std::thread::sleep(Duration::from_millis(20));
        let removed = cache.sweep_expired(|key| key == "hot");

        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 2);
        // The protected entry is still expired for direct lookups.
        assert_eq!(cache.get("hot"), None);
    }

    #[tokio::test]
    async fn sweeper_task_stops_on_cancel() {
        let cache: LruCache<u32> = CacheBuilder::new().capacity(8).build();
        let token = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_millis(5), token.clone());

        cache.set("gone", 1, Some(Duration::from_millis(1)));
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.len(), 0);

        token.cancel();
        handle.await.unwrap();
    }
}
