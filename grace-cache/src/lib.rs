//! # Grace Cache
//!
//! Expiring, single-flight cache entries.
//!
//! Each [`CacheEntry`] lazily computes its value and refreshes it once it is
//! older than a timeout. Concurrent refreshes of one entry collapse into a
//! single updater call; callers that tolerate staleness get the previous
//! value instead of waiting. [`ExpiringCache`] keys entries in a concurrent
//! map and keeps hit statistics.
//!
//! ## Timeouts
//!
//! - `timeout < 0`: computed once, cached forever
//! - `timeout == 0`: recomputed on every call
//! - `timeout > 0`: recomputed once older than `timeout` milliseconds
//!
//! ## Example
//!
//! ```rust
//! use grace_cache::{CacheConfig, ExpiringCache};
//!
//! let cache: ExpiringCache<String, usize> = ExpiringCache::new(CacheConfig::forever());
//! let len = cache
//!     .get_or_compute("/book/show".to_string(), || Ok::<_, std::io::Error>(10))
//!     .unwrap();
//! assert_eq!(len, 10);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;
mod entry;
mod error;

pub use cache::{
    entry_for, get_or_create, get_or_create_with_factory, CacheConfig, CacheMap, CacheStats,
    ExpiringCache,
};
pub use entry::{CacheEntry, Lookup, PinPredicate, RefreshPolicy};
pub use error::UpdateError;
