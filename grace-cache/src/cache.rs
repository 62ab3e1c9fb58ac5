//! Keyed expiring cache.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use grace_core::{system_clock, SharedClock, CACHE_FOREVER, CACHE_NEVER, DEFAULT_CACHE_TIMEOUT_MS};

use crate::entry::{CacheEntry, Lookup, RefreshPolicy};
use crate::error::UpdateError;

/// Concurrent map of shared cache entries.
pub type CacheMap<K, V, C = ()> = DashMap<K, Arc<CacheEntry<V, C>>>;

/// Returns the entry for `key`, creating it with `entry_factory` on a miss.
///
/// Creation races are settled by insert-if-absent: the loser drops its own
/// entry and every caller gets the winner's.
pub fn entry_for<K, V, C, G>(map: &CacheMap<K, V, C>, key: K, entry_factory: G) -> Arc<CacheEntry<V, C>>
where
    K: Eq + Hash,
    G: FnOnce() -> CacheEntry<V, C>,
{
    if let Some(existing) = map.get(&key) {
        return Arc::clone(existing.value());
    }
    let fresh = Arc::new(entry_factory());
    // The shard guard must be gone before any updater runs.
    let winner = map.entry(key).or_insert(fresh);
    Arc::clone(winner.value())
}

/// Looks up `key` in `map`, computing the value with `updater` when it is
/// missing or older than `timeout_millis`. New entries are plain timed
/// entries on the system clock.
pub fn get_or_create<K, V, F, E>(
    map: &CacheMap<K, V>,
    key: K,
    timeout_millis: i64,
    tolerate_stale: bool,
    updater: F,
) -> Result<V, UpdateError<E>>
where
    K: Eq + Hash,
    V: Clone,
    F: FnOnce() -> Result<V, E>,
{
    get_or_create_with_factory(map, key, &(), timeout_millis, tolerate_stale, updater, CacheEntry::new)
}

/// [`get_or_create`] with a request context and a custom entry factory.
pub fn get_or_create_with_factory<K, V, C, F, E, G>(
    map: &CacheMap<K, V, C>,
    key: K,
    ctx: &C,
    timeout_millis: i64,
    tolerate_stale: bool,
    updater: F,
    entry_factory: G,
) -> Result<V, UpdateError<E>>
where
    K: Eq + Hash,
    V: Clone,
    F: FnOnce() -> Result<V, E>,
    G: FnOnce() -> CacheEntry<V, C>,
{
    entry_for(map, key, entry_factory).get_or_compute_with(ctx, timeout_millis, tolerate_stale, updater)
}

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Staleness timeout in milliseconds. Negative caches forever, zero
    /// recomputes on every call.
    pub timeout_millis: i64,
    /// Serve the previous value instead of waiting for a running refresh.
    pub tolerate_stale: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            timeout_millis: DEFAULT_CACHE_TIMEOUT_MS,
            tolerate_stale: true,
        }
    }
}

impl CacheConfig {
    /// Values are computed once and kept.
    pub fn forever() -> Self {
        Self {
            timeout_millis: CACHE_FOREVER,
            ..Default::default()
        }
    }

    /// Values are recomputed on every call.
    pub fn never() -> Self {
        Self {
            timeout_millis: CACHE_NEVER,
            ..Default::default()
        }
    }

    /// Values expire after `timeout_millis`.
    pub fn with_timeout(timeout_millis: i64) -> Self {
        Self {
            timeout_millis,
            ..Default::default()
        }
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub initialized_entries: usize,
    pub fresh_hits: u64,
    pub stale_hits: u64,
    pub coalesced: u64,
    pub computations: u64,
    pub failures: u64,
}

impl CacheStats {
    /// Lookups answered without running an updater.
    pub fn hits(&self) -> u64 {
        self.fresh_hits + self.stale_hits + self.coalesced
    }

    /// All answered or failed lookups.
    pub fn lookups(&self) -> u64 {
        self.hits() + self.computations + self.failures
    }
}

#[derive(Debug, Default)]
struct Counters {
    fresh_hits: AtomicU64,
    stale_hits: AtomicU64,
    coalesced: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn record(&self, lookup: Lookup) {
        let counter = match lookup {
            Lookup::Fresh => &self.fresh_hits,
            Lookup::Stale => &self.stale_hits,
            Lookup::Coalesced => &self.coalesced,
            Lookup::Computed => &self.computations,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.fresh_hits,
            &self.stale_hits,
            &self.coalesced,
            &self.computations,
            &self.failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Keyed cache of single-flight entries.
///
/// Entries live until explicitly invalidated. Independent keys never contend
/// on each other's update locks.
pub struct ExpiringCache<K, V, C = ()> {
    entries: CacheMap<K, V, C>,
    config: CacheConfig,
    clock: SharedClock,
    policy: RefreshPolicy<V, C>,
    counters: Counters,
}

impl<K, V, C> ExpiringCache<K, V, C>
where
    K: Eq + Hash,
{
    /// Creates a cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a cache on the given clock.
    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
            policy: RefreshPolicy::Timed,
            counters: Counters::default(),
        }
    }

    /// Sets the refresh policy given to entries created from now on.
    pub fn with_policy(mut self, policy: RefreshPolicy<V, C>) -> Self {
        self.policy = policy;
        self
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the entry for `key`, creating an empty one on a miss.
    pub fn entry(&self, key: K) -> Arc<CacheEntry<V, C>> {
        entry_for(&self.entries, key, || self.new_entry())
    }

    fn new_entry(&self) -> CacheEntry<V, C> {
        CacheEntry::with_policy(Arc::clone(&self.clock), self.policy.clone())
    }

    /// Removes `key`. Returns true if it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!("invalidated cache entry");
        }
        removed
    }

    /// Marks `key` expired without dropping its value. Returns true if it
    /// was present.
    pub fn expire(&self, key: &K) -> bool {
        match self.entries.get(key) {
            Some(entry) => {
                entry.expire();
                true
            }
            None => false,
        }
    }

    /// Marks every entry expired.
    pub fn expire_all(&self) {
        for entry in self.entries.iter() {
            entry.expire();
        }
    }

    /// Removes all entries and resets statistics.
    pub fn clear(&self) {
        self.entries.clear();
        self.counters.reset();
    }

    /// Number of entries, initialized or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let initialized = self
            .entries
            .iter()
            .filter(|entry| entry.is_initialized())
            .count();
        CacheStats {
            entries: self.entries.len(),
            initialized_entries: initialized,
            fresh_hits: self.counters.fresh_hits.load(Ordering::Relaxed),
            stale_hits: self.counters.stale_hits.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

impl<K, V, C> ExpiringCache<K, V, C>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns the published value for `key` without computing anything.
    pub fn peek(&self, key: &K) -> Option<V> {
        // Ref::value yields the Arc; the second call reads the entry.
        self.entries.get(key).and_then(|slot| slot.value().value())
    }

    /// Returns the cached value for `key`, running `updater` when it is
    /// missing or stale. `ctx` is handed to the refresh policy.
    pub fn get_or_compute_with<F, E>(&self, key: K, ctx: &C, updater: F) -> Result<V, UpdateError<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_compute_with_factory(key, ctx, updater, || self.new_entry())
    }

    /// Like [`get_or_compute_with`](Self::get_or_compute_with), creating a
    /// missing entry with `entry_factory` instead of the cache's policy.
    pub fn get_or_compute_with_factory<F, E, G>(
        &self,
        key: K,
        ctx: &C,
        updater: F,
        entry_factory: G,
    ) -> Result<V, UpdateError<E>>
    where
        F: FnOnce() -> Result<V, E>,
        G: FnOnce() -> CacheEntry<V, C>,
    {
        let entry = entry_for(&self.entries, key, entry_factory);
        match entry.observe(ctx, self.config.timeout_millis, self.config.tolerate_stale, updater) {
            Ok((value, lookup)) => {
                self.counters.record(lookup);
                Ok(value)
            }
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// [`get_or_compute_with`](Self::get_or_compute_with) without a request
    /// context.
    pub fn get_or_compute<F, E>(&self, key: K, updater: F) -> Result<V, UpdateError<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_compute_with(key, &(), updater)
    }
}

impl<K, V, C> Default for ExpiringCache<K, V, C>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
