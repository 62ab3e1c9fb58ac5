//! Common traits for Grace view resolution.
//!
//! These are the seams where collaborators are injected: the wall clock the
//! caches measure staleness against, and the resolver that maps a lookup key
//! to a page.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::types::{CacheKey, PageSource};

// ═══════════════════════════════════════════════════════════════════════════════
// CLOCK TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Wall-clock source in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time in milliseconds.
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
///
/// Starts at a non-zero instant, since a zero timestamp marks an entry as
/// never published.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `start_millis`.
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Returns a shared handle to the system clock.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps a lookup key to a page.
///
/// Implementations search a list of candidate locations and return the first
/// match. Resolution may touch the filesystem, so callers are expected to
/// put a cache in front of it.
pub trait PageResolver: Send + Sync {
    /// Resolves `key`, returning `Ok(None)` when no candidate matches.
    fn resolve(&self, key: &CacheKey) -> Result<Option<PageSource>>;
}

impl<R: PageResolver + ?Sized> PageResolver for Arc<R> {
    fn resolve(&self, key: &CacheKey) -> Result<Option<PageSource>> {
        (**self).resolve(key)
    }
}
