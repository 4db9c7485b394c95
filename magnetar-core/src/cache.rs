//! Adaptive TTL cache fronting the resolution cascade.
//!
//! Entries expire lazily on read, a periodic sweep bounds memory used by
//! entries nobody re-reads, and LRU eviction keeps the store at capacity.
//! TTLs are computed per content type and scaled by result count: abundant
//! results mean a popular, stable title that is safe to cache longer, while
//! sparse results should be revalidated sooner.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::RwLock;

use crate::errors::ResolveError;
use crate::identifier::ContentType;

/// Pluggable TTL policy.
pub trait TtlStrategy: Send + Sync + std::fmt::Debug {
    /// TTL for a result set of `result_count` records of the given type.
    fn ttl_for(&self, content_type: ContentType, result_count: usize) -> Duration;
}

/// Default count-based TTL policy.
///
/// Base TTL per content type, scaled x1.5 above 10 results and x0.5 below 3,
/// clamped to `[min_ttl, max_ttl]`.
#[derive(Debug, Clone)]
pub struct CountBasedTtl {
    /// Base TTL for movie lookups
    pub movie_base: Duration,
    /// Base TTL for series lookups
    pub series_base: Duration,
    /// Base TTL for anime lookups
    pub anime_base: Duration,
    /// Lower clamp bound
    pub min_ttl: Duration,
    /// Upper clamp bound
    pub max_ttl: Duration,
}

impl Default for CountBasedTtl {
    fn default() -> Self {
        Self {
            movie_base: Duration::from_secs(45 * 60),
            series_base: Duration::from_secs(30 * 60),
            anime_base: Duration::from_secs(60 * 60),
            min_ttl: Duration::from_secs(5 * 60),
            max_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl TtlStrategy for CountBasedTtl {
    fn ttl_for(&self, content_type: ContentType, result_count: usize) -> Duration {
        let base = match content_type {
            ContentType::Movie => self.movie_base,
            ContentType::Series => self.series_base,
            ContentType::Anime => self.anime_base,
        };
        let scaled = if result_count > 10 {
            base.mul_f64(1.5)
        } else if result_count < 3 {
            base.mul_f64(0.5)
        } else {
            base
        };
        scaled.clamp(self.min_ttl, self.max_ttl)
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction
    pub max_entries: usize,
    /// TTL used when no strategy-computed TTL applies
    pub default_ttl: Duration,
    /// Interval of the background expiry sweep
    pub sweep_interval: Duration,
    /// Enable the background sweep task
    pub enable_sweep: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(300), // 5 minutes
            enable_sweep: true,
        }
    }
}

/// Cached value with expiry and access metadata.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
    last_accessed: Instant,
    access_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
            last_accessed: now,
            access_count: 0,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Instant::now();
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Entries currently stored
    pub entry_count: usize,
    /// Configured capacity
    pub capacity: usize,
    /// Number of cache hits
    pub hit_count: u64,
    /// Number of cache misses (including expired reads)
    pub miss_count: u64,
    /// Entries removed by expiry or LRU pressure
    pub eviction_count: u64,
    /// Hit rate percentage
    pub hit_rate: f64,
}

impl CacheStats {
    fn hit_rate(hit_count: u64, miss_count: u64) -> f64 {
        if hit_count + miss_count == 0 {
            0.0
        } else {
            (hit_count as f64) / ((hit_count + miss_count) as f64) * 100.0
        }
    }
}

/// TTL key/value store with LRU eviction and adaptive TTL computation.
///
/// Best-effort by contract: operations never propagate an error into the
/// surrounding search, a failed `set` just means the next lookup misses.
pub struct AdaptiveCache<V: Clone + Send + Sync + 'static> {
    inner: Arc<RwLock<LruCache<String, CacheEntry<V>>>>,
    strategy: Arc<dyn TtlStrategy>,
    config: CacheConfig,
    hit_count: Arc<AtomicU64>,
    miss_count: Arc<AtomicU64>,
    eviction_count: Arc<AtomicU64>,
    _sweep_handle: Option<tokio::task::JoinHandle<()>>,
}

impl<V: Clone + Send + Sync + 'static> std::fmt::Debug for AdaptiveCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveCache")
            .field("config", &self.config)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> AdaptiveCache<V> {
    /// Creates a cache with the given configuration and TTL strategy.
    pub fn new(config: CacheConfig, strategy: Arc<dyn TtlStrategy>) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries)
            .unwrap_or_else(|| NonZeroUsize::new(1000).expect("non-zero capacity"));
        let inner = Arc::new(RwLock::new(LruCache::new(capacity)));
        let eviction_count = Arc::new(AtomicU64::new(0));

        let sweep_handle = if config.enable_sweep {
            let inner_clone = Arc::clone(&inner);
            let eviction_clone = Arc::clone(&eviction_count);
            let sweep_interval = config.sweep_interval;

            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    Self::sweep_expired(&inner_clone, &eviction_clone).await;
                }
            }))
        } else {
            None
        };

        Self {
            inner,
            strategy,
            config,
            hit_count: Arc::new(AtomicU64::new(0)),
            miss_count: Arc::new(AtomicU64::new(0)),
            eviction_count,
            _sweep_handle: sweep_handle,
        }
    }

    /// Creates a cache with the default count-based TTL strategy.
    pub fn with_defaults(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(CountBasedTtl::default()))
    }

    /// Looks up a key, expiring it on read when past its deadline.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut cache = self.inner.write().await;

        let expired = matches!(cache.peek(key), Some(entry) if entry.is_expired());
        if expired {
            cache.pop(key);
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache entry expired on read: {key}");
            return None;
        }

        // get_mut also promotes the entry to most-recently-used.
        if let Some(entry) = cache.get_mut(key) {
            entry.mark_accessed();
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "Cache hit for {key} (access #{}, age: {:?})",
                entry.access_count,
                entry.created_at.elapsed()
            );
            Some(entry.value.clone())
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache miss for {key}");
            None
        }
    }

    /// Stores a value. Inserting a new key at capacity evicts the entry with
    /// the oldest `last_accessed` first.
    ///
    /// # Errors
    /// - `ResolveError::Cache` - the value was rejected (zero TTL). Callers
    ///   swallow this per the best-effort contract; the next lookup misses.
    pub async fn set(&self, key: String, value: V, ttl: Option<Duration>) -> Result<(), ResolveError> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        if ttl.is_zero() {
            return Err(ResolveError::Cache {
                reason: format!("refusing to cache {key} with zero TTL"),
            });
        }

        let mut cache = self.inner.write().await;
        let will_evict = cache.len() == cache.cap().get() && !cache.contains(&key);
        cache.put(key, CacheEntry::new(value, ttl));
        if will_evict {
            self.eviction_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Stores a value with a TTL computed by the configured strategy from the
    /// content type and result count.
    ///
    /// # Errors
    /// Same as [`set`](Self::set).
    pub async fn set_adaptive(
        &self,
        key: String,
        value: V,
        content_type: ContentType,
        result_count: usize,
    ) -> Result<(), ResolveError> {
        let ttl = self.strategy.ttl_for(content_type, result_count);
        tracing::debug!(
            "Adaptive TTL for {key}: {:?} ({} results, {content_type})",
            ttl,
            result_count
        );
        self.set(key, value, Some(ttl)).await
    }

    /// Whether a live (non-expired) entry exists, without touching recency.
    pub async fn has(&self, key: &str) -> bool {
        let cache = self.inner.read().await;
        matches!(cache.peek(key), Some(entry) if !entry.is_expired())
    }

    /// Removes a key. Returns whether an entry was present.
    pub async fn delete(&self, key: &str) -> bool {
        let mut cache = self.inner.write().await;
        cache.pop(key).is_some()
    }

    /// Removes every key matching a glob pattern (`*` and `?` wildcards).
    /// Returns the number of entries removed.
    pub async fn invalidate_matching(&self, pattern: &str) -> usize {
        let regex_source = format!(
            "^{}$",
            regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".")
        );
        let matcher = match regex::Regex::new(&regex_source) {
            Ok(matcher) => matcher,
            Err(err) => {
                tracing::warn!("Invalid invalidation pattern '{pattern}': {err}");
                return 0;
            }
        };

        let mut cache = self.inner.write().await;
        let matching: Vec<String> = cache
            .iter()
            .filter(|(key, _)| matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in matching {
            if cache.pop(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Number of entries currently stored, expired or not.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Snapshot of cache counters.
    pub async fn stats(&self) -> CacheStats {
        let cache = self.inner.read().await;
        let hit_count = self.hit_count.load(Ordering::Relaxed);
        let miss_count = self.miss_count.load(Ordering::Relaxed);
        CacheStats {
            entry_count: cache.len(),
            capacity: cache.cap().get(),
            hit_count,
            miss_count,
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            hit_rate: CacheStats::hit_rate(hit_count, miss_count),
        }
    }

    /// Removes expired entries eagerly. Also run periodically by the
    /// background sweep task.
    pub async fn sweep(&self) {
        Self::sweep_expired(&self.inner, &self.eviction_count).await;
    }

    async fn sweep_expired(
        inner: &Arc<RwLock<LruCache<String, CacheEntry<V>>>>,
        eviction_count: &Arc<AtomicU64>,
    ) {
        let mut cache = inner.write().await;
        let expired: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            if cache.pop(&key).is_some() {
                eviction_count.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Swept expired cache entry: {key}");
            }
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Drop for AdaptiveCache<V> {
    fn drop(&mut self) {
        if let Some(handle) = self._sweep_handle.take() {
            handle.abort();
        }
    }
}
