//! # Grace Views
//!
//! Convention-based view lookup with a reload-aware cache in front of it.
//!
//! - [`ConventionPageResolver`] searches precompiled pages, then plugin and
//!   application view directories, returning the first match.
//! - [`CachingPageLocator`] caches every lookup, including misses. Pages
//!   compiled ahead of time are pinned; files on disk are re-resolved once
//!   the cache timeout elapses, unless reloading is disabled.
//!
//! ## Example
//!
//! ```rust,ignore
//! use grace_views::{CachingPageLocator, ConventionPageResolver, LocatorConfig};
//!
//! let resolver = ConventionPageResolver::new().with_root("/srv/app");
//! let locator = CachingPageLocator::new(resolver, LocatorConfig::default());
//! let page = locator.find_view(Some("book"), "show", None)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod config;
mod locator;
mod resolver;

pub use config::{LocatorConfig, ENV_CACHE_TIMEOUT_MS, ENV_RELOAD_ENABLED};
pub use locator::{template_uri, CachingPageLocator, PageCache};
pub use resolver::{normalize_uri, validate_namespace, ConventionPageResolver};
