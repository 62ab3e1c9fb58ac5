//! Single-flight cache entry.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use grace_core::{system_clock, SharedClock, CACHE_NEVER, NEVER_PUBLISHED};

use crate::error::UpdateError;

/// Predicate deciding whether a published value is pinned forever.
pub type PinPredicate<V, C> = Arc<dyn Fn(&V, &C) -> bool + Send + Sync>;

/// When an entry's published value may be recomputed.
///
/// Time-based expiry and pinning are separate: a pinned value is never
/// recomputed under a non-zero timeout, an unpinned value follows the
/// timeout. A zero timeout recomputes every value.
pub enum RefreshPolicy<V, C = ()> {
    /// Recompute once the timeout has elapsed.
    Timed,
    /// Like `Timed`, but values matching the predicate never expire.
    PinWhen(PinPredicate<V, C>),
}

impl<V, C> RefreshPolicy<V, C> {
    /// Pins values matching `predicate`. The predicate also receives the
    /// caller's request context.
    pub fn pin_when<F>(predicate: F) -> Self
    where
        F: Fn(&V, &C) -> bool + Send + Sync + 'static,
    {
        RefreshPolicy::PinWhen(Arc::new(predicate))
    }

    /// Returns true if `value` must never be recomputed.
    pub fn is_pinned(&self, value: &V, ctx: &C) -> bool {
        match self {
            RefreshPolicy::Timed => false,
            RefreshPolicy::PinWhen(predicate) => predicate(value, ctx),
        }
    }
}

impl<V, C> Clone for RefreshPolicy<V, C> {
    fn clone(&self) -> Self {
        match self {
            RefreshPolicy::Timed => RefreshPolicy::Timed,
            RefreshPolicy::PinWhen(predicate) => RefreshPolicy::PinWhen(Arc::clone(predicate)),
        }
    }
}

impl<V, C> Default for RefreshPolicy<V, C> {
    fn default() -> Self {
        RefreshPolicy::Timed
    }
}

impl<V, C> fmt::Debug for RefreshPolicy<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshPolicy::Timed => f.write_str("Timed"),
            RefreshPolicy::PinWhen(_) => f.write_str("PinWhen(..)"),
        }
    }
}

/// How a lookup was answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// Published value was still valid (or pinned).
    Fresh,
    /// Another thread was refreshing; the previous value was returned.
    Stale,
    /// Waited for another thread's refresh and returned its result.
    Coalesced,
    /// This call ran the updater.
    Computed,
}

/// A lazily computed value with time-based staleness.
///
/// Readers on the fast path only take the value slot's read lock, which is
/// never held while an updater runs. The update lock serializes refreshes so
/// at most one updater runs per entry.
pub struct CacheEntry<V, C = ()> {
    value: RwLock<Option<V>>,
    /// Millis of the last publish; `NEVER_PUBLISHED` when unset or expired.
    created_at_millis: AtomicI64,
    initialized: AtomicBool,
    update_lock: Mutex<()>,
    policy: RefreshPolicy<V, C>,
    clock: SharedClock,
}

impl<V, C> CacheEntry<V, C> {
    /// Creates an empty, pre-expired entry on the system clock.
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Creates an empty entry on the given clock.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self::with_policy(clock, RefreshPolicy::Timed)
    }

    /// Creates an empty entry with a refresh policy.
    pub fn with_policy(clock: SharedClock, policy: RefreshPolicy<V, C>) -> Self {
        Self {
            value: RwLock::new(None),
            created_at_millis: AtomicI64::new(NEVER_PUBLISHED),
            initialized: AtomicBool::new(false),
            update_lock: Mutex::new(()),
            policy,
            clock,
        }
    }

    /// Returns true once a value has been published.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Time of the last publish, or `0` if never published or expired.
    pub fn created_at_millis(&self) -> i64 {
        self.created_at_millis.load(Ordering::Acquire)
    }

    /// Returns true if the published value is older than `timeout_millis`.
    ///
    /// A force-expired or never-published entry is always expired.
    pub fn has_expired(&self, timeout_millis: i64) -> bool {
        self.expired_since(self.created_at_millis(), timeout_millis)
    }

    /// Marks the entry expired. The next non-stale lookup recomputes it.
    pub fn expire(&self) {
        self.created_at_millis.store(NEVER_PUBLISHED, Ordering::Release);
    }

    /// The refresh policy this entry was built with.
    pub fn policy(&self) -> &RefreshPolicy<V, C> {
        &self.policy
    }

    fn expired_since(&self, stamp: i64, timeout_millis: i64) -> bool {
        stamp == NEVER_PUBLISHED
            || (timeout_millis >= 0 && self.clock.now_millis() - stamp > timeout_millis)
    }

    /// True when nobody refreshed the entry since `snapshot` was taken.
    fn should_update(&self, snapshot: i64) -> bool {
        let current = self.created_at_millis();
        snapshot == current || current == NEVER_PUBLISHED
    }

    /// Publishes `value`. Callers hold the update lock.
    fn publish(&self, value: V) {
        *self.value.write() = Some(value);
        self.initialized.store(true, Ordering::Release);
        // Zero is reserved for "never published".
        let now = self.clock.now_millis().max(1);
        self.created_at_millis.store(now, Ordering::Release);
    }
}

impl<V: Clone, C> CacheEntry<V, C> {
    /// Returns the published value without computing anything.
    pub fn value(&self) -> Option<V> {
        if !self.is_initialized() {
            return None;
        }
        self.value.read().clone()
    }

    /// Publishes `value` directly, waiting for any running refresh.
    pub fn set_value(&self, value: V) {
        let _guard = self.update_lock.lock();
        self.publish(value);
    }

    /// Returns the cached value, running `updater` if it is missing or stale.
    ///
    /// `ctx` is handed to the refresh policy and otherwise ignored. With
    /// `tolerate_stale`, a caller that finds another refresh in progress gets
    /// the previous value instead of waiting; it still waits when there is no
    /// previous value.
    ///
    /// A failing updater leaves the published value and timestamp untouched.
    pub fn get_or_compute_with<F, E>(
        &self,
        ctx: &C,
        timeout_millis: i64,
        tolerate_stale: bool,
        updater: F,
    ) -> Result<V, UpdateError<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.observe(ctx, timeout_millis, tolerate_stale, updater)
            .map(|(value, _)| value)
    }

    /// Same as [`get_or_compute_with`](Self::get_or_compute_with), also
    /// reporting how the lookup was answered.
    pub fn observe<F, E>(
        &self,
        ctx: &C,
        timeout_millis: i64,
        tolerate_stale: bool,
        updater: F,
    ) -> Result<(V, Lookup), UpdateError<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if timeout_millis == CACHE_NEVER {
            return self.compute_unlocked(updater);
        }

        // Taken before the freshness check so a refresh that lands in between
        // is seen by should_update.
        let snapshot = self.created_at_millis();
        if let Some(value) = self.fresh_value(snapshot, ctx, timeout_millis) {
            return Ok((value, Lookup::Fresh));
        }

        let _guard = if tolerate_stale {
            match self.update_lock.try_lock() {
                Some(guard) => guard,
                None => {
                    if let Some(stale) = self.value() {
                        trace!("refresh in progress, serving previous value");
                        return Ok((stale, Lookup::Stale));
                    }
                    self.update_lock.lock()
                }
            }
        } else {
            self.update_lock.lock()
        };

        if self.is_initialized() && !self.should_update(snapshot) {
            if let Some(value) = self.value() {
                return Ok((value, Lookup::Coalesced));
            }
        }

        let value = updater().map_err(Self::update_failed)?;
        self.publish(value.clone());
        Ok((value, Lookup::Computed))
    }

    fn fresh_value(&self, snapshot: i64, ctx: &C, timeout_millis: i64) -> Option<V> {
        if !self.is_initialized() {
            return None;
        }
        let slot = self.value.read();
        let value = slot.as_ref()?;
        if self.policy.is_pinned(value, ctx) || !self.expired_since(snapshot, timeout_millis) {
            Some(value.clone())
        } else {
            None
        }
    }

    /// Always-recompute mode: no single-flight, publish only if uncontended.
    fn compute_unlocked<F, E>(&self, updater: F) -> Result<(V, Lookup), UpdateError<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let value = updater().map_err(Self::update_failed)?;
        if let Some(_guard) = self.update_lock.try_lock() {
            self.publish(value.clone());
        }
        Ok((value, Lookup::Computed))
    }

    fn update_failed<E>(cause: E) -> UpdateError<E> {
        debug!("cache updater failed, keeping previous value");
        UpdateError::new(cause)
    }
}

impl<V: Clone> CacheEntry<V, ()> {
    /// [`get_or_compute_with`](Self::get_or_compute_with) without a request
    /// context.
    pub fn get_or_compute<F, E>(
        &self,
        timeout_millis: i64,
        tolerate_stale: bool,
        updater: F,
    ) -> Result<V, UpdateError<E>>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.get_or_compute_with(&(), timeout_millis, tolerate_stale, updater)
    }
}

impl<V, C> Default for CacheEntry<V, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C> fmt::Debug for CacheEntry<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("initialized", &self.is_initialized())
            .field("created_at_millis", &self.created_at_millis())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::{Duration, Instant};

    use grace_core::{Clock, ManualClock};
    use test_case::test_case;

    fn manual_entry<V>() -> (Arc<ManualClock>, CacheEntry<V>) {
        let clock = Arc::new(ManualClock::default());
        let entry = CacheEntry::with_clock(clock.clone());
        (clock, entry)
    }

    fn ok<V>(value: V) -> Result<V, String> {
        Ok(value)
    }

    #[test]
    fn test_new_entry_is_pre_expired() {
        let entry: CacheEntry<u32> = CacheEntry::new();
        assert!(!entry.is_initialized());
        assert_eq!(entry.created_at_millis(), NEVER_PUBLISHED);
        assert!(entry.has_expired(-1));
        assert!(entry.value().is_none());
    }

    #[test]
    fn test_first_call_computes_then_caches() {
        let (_clock, entry) = manual_entry();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = entry
                .get_or_compute(1_000, false, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok(7)
                })
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(entry.is_initialized());
    }

    #[test]
    fn test_recomputes_after_timeout() {
        let (clock, entry) = manual_entry();
        entry.get_or_compute(100, false, || ok(1)).unwrap();

        clock.advance(100);
        assert_eq!(entry.get_or_compute(100, false, || ok(2)).unwrap(), 1);

        clock.advance(1);
        assert_eq!(entry.get_or_compute(100, false, || ok(2)).unwrap(), 2);
        assert_eq!(entry.created_at_millis(), clock.now_millis());
    }

    #[test]
    fn test_cache_forever() {
        let (clock, entry) = manual_entry();
        let calls = AtomicUsize::new(0);
        let updater = || {
            calls.fetch_add(1, Ordering::SeqCst);
            ok("page")
        };
        entry.get_or_compute(-1, false, updater).unwrap();
        for step in [1, 1_000, 1_000_000, i64::from(u32::MAX)] {
            clock.advance(step);
            let v = entry
                .get_or_compute(-1, true, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok("other")
                })
                .unwrap();
            assert_eq!(v, "page");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test_case(false ; "blocking")]
    #[test_case(true ; "stale tolerant")]
    fn test_always_recompute(tolerate_stale: bool) {
        let (_clock, entry) = manual_entry();
        let calls = AtomicUsize::new(0);
        for i in 0..5usize {
            let v = entry
                .get_or_compute(0, tolerate_stale, || Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst)))
                .unwrap();
            assert_eq!(v, i);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_always_recompute_under_contention() {
        let entry: Arc<CacheEntry<usize>> = Arc::new(CacheEntry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let entry = entry.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    entry
                        .get_or_compute(0, false, || {
                            thread::sleep(Duration::from_millis(5));
                            Ok::<_, String>(calls.fetch_add(1, Ordering::SeqCst))
                        })
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_none_is_a_cached_value() {
        let (_clock, entry) = manual_entry::<Option<String>>();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = entry
                .get_or_compute(10_000, false, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok(None)
                })
                .unwrap();
            assert!(v.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(entry.is_initialized());
        assert_eq!(entry.value(), Some(None));
    }

    #[test_case(0 ; "always recompute")]
    #[test_case(1_000 ; "timed")]
    #[test_case(-1 ; "forever")]
    fn test_failure_leaves_entry_uninitialized(timeout: i64) {
        let (_clock, entry) = manual_entry::<u32>();
        let err = entry
            .get_or_compute(timeout, false, || Err::<u32, _>("disk on fire".to_string()))
            .unwrap_err();
        assert_eq!(err.into_inner(), "disk on fire");
        assert!(!entry.is_initialized());
        assert_eq!(entry.created_at_millis(), NEVER_PUBLISHED);

        assert_eq!(entry.get_or_compute(timeout, false, || ok(5)).unwrap(), 5);
        assert!(entry.is_initialized());
        assert_eq!(entry.value(), Some(5));
    }

    #[test]
    fn test_failed_refresh_keeps_previous_value() {
        let (clock, entry) = manual_entry::<u32>();
        entry.get_or_compute(10, false, || ok(1)).unwrap();
        let published_at = entry.created_at_millis();

        clock.advance(50);
        assert!(entry.get_or_compute(10, false, || Err::<u32, _>("boom".to_string())).is_err());
        assert_eq!(entry.value(), Some(1));
        assert_eq!(entry.created_at_millis(), published_at);

        assert_eq!(entry.get_or_compute(10, false, || ok(2)).unwrap(), 2);
    }

    #[test]
    fn test_single_flight() {
        let entry: Arc<CacheEntry<usize>> = Arc::new(CacheEntry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let entry = entry.clone();
                let counter = counter.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    entry
                        .get_or_compute(60_000, false, || {
                            thread::sleep(Duration::from_millis(50));
                            Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst) + 1)
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_stale_tolerant_reader_does_not_block() {
        let clock = Arc::new(ManualClock::default());
        let entry: Arc<CacheEntry<u32>> = Arc::new(CacheEntry::with_clock(clock.clone()));
        entry.get_or_compute(100, true, || ok(1)).unwrap();
        clock.advance(1_000);

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let writer = {
            let entry = entry.clone();
            thread::spawn(move || {
                entry
                    .get_or_compute(100, true, || {
                        entered_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        ok(2)
                    })
                    .unwrap()
            })
        };
        entered_rx.recv().unwrap();

        let started = Instant::now();
        let (value, lookup) = entry
            .observe(&(), 100, true, || ok(99))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(value, 1);
        assert_eq!(lookup, Lookup::Stale);

        release_tx.send(()).unwrap();
        assert_eq!(writer.join().unwrap(), 2);
        assert_eq!(entry.get_or_compute(100, true, || ok(99)).unwrap(), 2);
    }

    #[test]
    fn test_stale_tolerant_waits_without_previous_value() {
        let entry: Arc<CacheEntry<u32>> = Arc::new(CacheEntry::new());
        let (entered_tx, entered_rx) = mpsc::channel();

        let writer = {
            let entry = entry.clone();
            thread::spawn(move || {
                entry
                    .get_or_compute(60_000, true, || {
                        entered_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(50));
                        ok(3)
                    })
                    .unwrap()
            })
        };
        entered_rx.recv().unwrap();

        let (value, lookup) = entry.observe(&(), 60_000, true, || ok(99)).unwrap();
        assert_eq!(value, 3);
        assert_eq!(lookup, Lookup::Coalesced);
        assert_eq!(writer.join().unwrap(), 3);
    }

    #[test]
    fn test_expire_forces_recompute_even_when_cached_forever() {
        let (_clock, entry) = manual_entry();
        entry.get_or_compute(-1, false, || ok(1)).unwrap();
        entry.expire();
        assert!(entry.has_expired(-1));
        // Previous value stays readable until the refresh lands.
        assert_eq!(entry.value(), Some(1));
        assert_eq!(entry.get_or_compute(-1, false, || ok(2)).unwrap(), 2);
    }

    #[test]
    fn test_set_value_publishes() {
        let (clock, entry) = manual_entry();
        entry.set_value(4);
        assert_eq!(entry.created_at_millis(), clock.now_millis());
        assert_eq!(entry.get_or_compute(1_000, false, || ok(5)).unwrap(), 4);
    }

    #[test]
    fn test_pinned_value_never_expires() {
        let clock = Arc::new(ManualClock::default());
        let entry: CacheEntry<i32> =
            CacheEntry::with_policy(clock.clone(), RefreshPolicy::pin_when(|v: &i32, _: &()| *v < 0));

        entry.get_or_compute(10, false, || ok(-1)).unwrap();
        clock.advance(1_000);
        assert_eq!(entry.get_or_compute(10, false, || ok(2)).unwrap(), -1);
        assert_eq!(entry.get_or_compute(-1, false, || ok(2)).unwrap(), -1);
    }

    #[test]
    fn test_zero_timeout_recomputes_pinned_values() {
        let clock = Arc::new(ManualClock::default());
        let entry: CacheEntry<i32> =
            CacheEntry::with_policy(clock, RefreshPolicy::pin_when(|v: &i32, _: &()| *v < 0));
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = entry
                .get_or_compute(0, false, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok(-1)
                })
                .unwrap();
            assert_eq!(v, -1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_unpinned_value_follows_timeout() {
        let clock = Arc::new(ManualClock::default());
        let entry: CacheEntry<i32> =
            CacheEntry::with_policy(clock.clone(), RefreshPolicy::pin_when(|v: &i32, _: &()| *v < 0));

        entry.get_or_compute(10, false, || ok(1)).unwrap();
        clock.advance(1_000);
        assert_eq!(entry.get_or_compute(10, false, || ok(2)).unwrap(), 2);
    }

    #[test]
    fn test_pin_predicate_sees_context() {
        let clock = Arc::new(ManualClock::default());
        let entry: CacheEntry<u8, bool> =
            CacheEntry::with_policy(clock.clone(), RefreshPolicy::pin_when(|_: &u8, pin: &bool| *pin));

        entry.get_or_compute_with(&false, 10, false, || ok(1)).unwrap();
        clock.advance(100);
        assert_eq!(entry.get_or_compute_with(&true, 10, false, || ok(2)).unwrap(), 1);
        assert_eq!(entry.get_or_compute_with(&false, 10, false, || ok(2)).unwrap(), 2);
    }
}
