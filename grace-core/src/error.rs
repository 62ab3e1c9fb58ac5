//! Error types for Grace view resolution.
//!
//! This module provides the error hierarchy using `thiserror`.
//! Cache update failures keep the resolver's error type, so callers see the
//! same variant whether or not a cache sat in between.

use thiserror::Error;

/// Result type alias using `GraceError`.
pub type Result<T> = std::result::Result<T, GraceError>;

/// Main error type for view resolution operations.
#[derive(Debug, Error)]
pub enum GraceError {
    // ═══════════════════════════════════════════════════════════════════════════
    // LOOKUP ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lookup path is empty or escapes the view root.
    #[error("Invalid view path: {0}")]
    InvalidPath(String),

    /// Resolver failed for a reason other than "not found".
    #[error("Resolution failed for '{uri}': {reason}")]
    ResolutionFailed {
        /// View URI being resolved.
        uri: String,
        /// Why the resolver gave up.
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GraceError {
    /// Returns true if retrying the lookup may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GraceError::IoError(_) | GraceError::ResolutionFailed { .. }
        )
    }

    /// Returns true if this error was caused by the caller's input.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, GraceError::InvalidPath(_) | GraceError::ConfigError(_))
    }
}
