//! Resolution results.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What a view lookup resolved to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageSource {
    /// Page compiled ahead of time and registered by URI.
    ///
    /// These never change once found, so caches may pin them.
    Precompiled {
        /// Normalized view URI.
        uri: String,
        /// Name of the compiled page type.
        type_name: String,
    },
    /// Template file on disk.
    Resource {
        /// Normalized view URI.
        uri: String,
        /// Location of the template file.
        path: PathBuf,
        /// Modification time of the file when it was resolved.
        last_modified_millis: i64,
    },
}

impl PageSource {
    /// Normalized view URI.
    pub fn uri(&self) -> &str {
        match self {
            PageSource::Precompiled { uri, .. } | PageSource::Resource { uri, .. } => uri,
        }
    }

    /// Returns true for ahead-of-time compiled pages.
    pub fn is_precompiled(&self) -> bool {
        matches!(self, PageSource::Precompiled { .. })
    }

    /// File backing the page, if it lives on disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            PageSource::Resource { path, .. } => Some(path),
            PageSource::Precompiled { .. } => None,
        }
    }
}
