//! # Grace Core
//!
//! Core types, errors, and traits shared by the Grace view-resolution crates.
//!
//! - **Types**: [`CacheKey`] lookup keys and [`PageSource`] resolution results
//! - **Errors**: [`GraceError`] with context for resolution and configuration failures
//! - **Constants**: view naming conventions and cache timeout sentinels
//! - **Traits**: [`Clock`] and [`PageResolver`] seams for injection
//!
//! ## Example
//!
//! ```rust
//! use grace_core::CacheKey;
//!
//! let key = CacheKey::new(Some("/book/show"), None, Some("book"));
//! assert_eq!(key, CacheKey::for_path("/book/show").with_context("book"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{GraceError, Result};
pub use traits::*;
pub use types::*;
