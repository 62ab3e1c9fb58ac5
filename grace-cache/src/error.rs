//! Updater failures.

use std::error::Error;
use std::fmt;

use grace_core::GraceError;

/// Failure raised by a cache updater.
///
/// Carries the updater's own error unchanged so callers can hand back the
/// original type with [`UpdateError::into_inner`].
#[derive(Debug)]
pub struct UpdateError<E> {
    cause: E,
}

impl<E> UpdateError<E> {
    /// Wraps an updater error.
    pub fn new(cause: E) -> Self {
        Self { cause }
    }

    /// The updater's error.
    pub fn cause(&self) -> &E {
        &self.cause
    }

    /// Unwraps the updater's error.
    pub fn into_inner(self) -> E {
        self.cause
    }
}

impl<E: fmt::Display> fmt::Display for UpdateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache update failed: {}", self.cause)
    }
}

impl<E: Error + 'static> Error for UpdateError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

impl From<UpdateError<GraceError>> for GraceError {
    fn from(err: UpdateError<GraceError>) -> Self {
        err.into_inner()
    }
}
