//! Convention-based page resolution.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use grace_core::error::{GraceError, Result};
use grace_core::traits::PageResolver;
use grace_core::types::{CacheKey, PageSource};
use grace_core::{NAMESPACE_SEPARATOR, PAGE_EXTENSION, PLUGINS_DIR, VIEWS_DIR};

/// Normalizes a lookup path into a view URI.
///
/// Relative paths are placed under `/{context}/` when a context is given.
/// Repeated slashes collapse, and the page extension is appended when
/// missing. Paths containing `..` are rejected.
pub fn normalize_uri(path: &str, context: Option<&str>) -> Result<String> {
    let path = path.trim();
    if path.is_empty() {
        return Err(GraceError::InvalidPath("empty view path".into()));
    }

    let joined = match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(ctx) if !path.starts_with('/') => format!("{ctx}/{path}"),
        _ => path.to_string(),
    };

    let mut segments = Vec::new();
    for segment in joined.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." {
            return Err(GraceError::InvalidPath(path.to_string()));
        }
        segments.push(segment);
    }
    if segments.is_empty() {
        return Err(GraceError::InvalidPath(path.to_string()));
    }

    let mut uri = format!("/{}", segments.join("/"));
    if !uri.ends_with(PAGE_EXTENSION) {
        uri.push_str(PAGE_EXTENSION);
    }
    Ok(uri)
}

/// Checks that a plugin namespace is a single plain directory name.
///
/// Empty names, `.` and `..`, and names containing a path separator are
/// rejected, so a namespace can never lead outside `{root}/plugins/`.
pub fn validate_namespace(namespace: &str) -> Result<&str> {
    let invalid = namespace.is_empty()
        || namespace == "."
        || namespace == ".."
        || namespace.contains(&['/', '\\'][..])
        || Path::new(namespace).is_absolute();
    if invalid {
        return Err(GraceError::InvalidPath(format!("invalid namespace '{namespace}'")));
    }
    Ok(namespace)
}

fn registry_key(uri: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{ns}{NAMESPACE_SEPARATOR}{uri}"),
        None => uri.to_string(),
    }
}

fn modified_millis(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or_default()
}

/// Resolves views by searching candidate locations in order.
///
/// Order: precompiled pages (namespace-qualified first), then
/// `{root}/plugins/{namespace}/views/` for every root, then
/// `{root}/views/` for every root. The first match wins.
#[derive(Debug, Default)]
pub struct ConventionPageResolver {
    roots: Vec<PathBuf>,
    /// Registry key (`[namespace:]uri`) to compiled page type name.
    precompiled: RwLock<HashMap<String, String>>,
}

impl ConventionPageResolver {
    /// Creates a resolver with no roots and no precompiled pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a search root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Search roots, in order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Registers a page compiled ahead of time.
    pub fn register_precompiled(
        &self,
        path: &str,
        namespace: Option<&str>,
        type_name: impl Into<String>,
    ) -> Result<()> {
        let uri = normalize_uri(path, None)?;
        let namespace = namespace.map(validate_namespace).transpose()?;
        self.precompiled
            .write()
            .insert(registry_key(&uri, namespace), type_name.into());
        Ok(())
    }

    /// Removes a precompiled page. Returns true if it was registered.
    pub fn unregister_precompiled(&self, path: &str, namespace: Option<&str>) -> Result<bool> {
        let uri = normalize_uri(path, None)?;
        let namespace = namespace.map(validate_namespace).transpose()?;
        Ok(self
            .precompiled
            .write()
            .remove(&registry_key(&uri, namespace))
            .is_some())
    }

    /// Number of registered precompiled pages.
    pub fn precompiled_count(&self) -> usize {
        self.precompiled.read().len()
    }

    /// On-disk locations searched for `uri`, in order.
    pub fn candidate_paths(&self, uri: &str, namespace: Option<&str>) -> Vec<PathBuf> {
        let relative = uri.trim_start_matches('/');
        let mut candidates = Vec::with_capacity(self.roots.len() * 2);
        if let Some(ns) = namespace {
            candidates.extend(
                self.roots
                    .iter()
                    .map(|root| root.join(PLUGINS_DIR).join(ns).join(VIEWS_DIR).join(relative)),
            );
        }
        candidates.extend(self.roots.iter().map(|root| root.join(VIEWS_DIR).join(relative)));
        candidates
    }

    fn find_precompiled(&self, uri: &str, namespace: Option<&str>) -> Option<PageSource> {
        let registry = self.precompiled.read();
        namespace
            .and_then(|ns| registry.get(&registry_key(uri, Some(ns))))
            .or_else(|| registry.get(uri))
            .map(|type_name| PageSource::Precompiled {
                uri: uri.to_string(),
                type_name: type_name.clone(),
            })
    }

    fn probe(uri: &str, candidate: &Path) -> Result<Option<PageSource>> {
        match fs::metadata(candidate) {
            Ok(meta) if meta.is_file() => Ok(Some(PageSource::Resource {
                uri: uri.to_string(),
                path: candidate.to_path_buf(),
                last_modified_millis: modified_millis(&meta),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!(path = %candidate.display(), error = %e, "cannot inspect view candidate");
                Err(GraceError::IoError(e))
            }
        }
    }
}

impl PageResolver for ConventionPageResolver {
    #[instrument(skip_all, fields(key = %key))]
    fn resolve(&self, key: &CacheKey) -> Result<Option<PageSource>> {
        let path = key
            .path()
            .ok_or_else(|| GraceError::InvalidPath("lookup without a path".into()))?;
        let uri = normalize_uri(path, key.context())?;
        let namespace = key.namespace().map(validate_namespace).transpose()?;

        if let Some(page) = self.find_precompiled(&uri, namespace) {
            debug!(uri = %uri, "resolved precompiled page");
            return Ok(Some(page));
        }

        for candidate in self.candidate_paths(&uri, namespace) {
            if let Some(page) = Self::probe(&uri, &candidate)? {
                debug!(path = %candidate.display(), "resolved view file");
                return Ok(Some(page));
            }
        }

        debug!(uri = %uri, "no view found");
        Ok(None)
    }
}
