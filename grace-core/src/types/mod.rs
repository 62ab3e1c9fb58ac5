//! Domain types for Grace view resolution.
//!
//! - [`CacheKey`]: composite lookup key (path, namespace, context)
//! - [`PageSource`]: what a lookup resolved to

mod cache_key;
mod page;

pub use cache_key::*;
pub use page::*;
