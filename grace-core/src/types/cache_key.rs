//! Composite lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Immutable composite key for cached lookups.
///
/// Any field may be absent, and absence is part of the key's identity:
/// `("/a", None, None)` and `("/a", Some(""), None)` are different keys.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Lookup path (view URI).
    pub path: Option<String>,
    /// Namespace qualifier (plugin name).
    pub namespace: Option<String>,
    /// Search-context qualifier (controller name).
    pub context: Option<String>,
}

impl CacheKey {
    /// Creates a key from its three components.
    pub fn new(path: Option<&str>, namespace: Option<&str>, context: Option<&str>) -> Self {
        Self {
            path: path.map(str::to_owned),
            namespace: namespace.map(str::to_owned),
            context: context.map(str::to_owned),
        }
    }

    /// Creates a key with only a lookup path.
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Returns a copy qualified by `namespace`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Returns a copy qualified by `context`.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Lookup path, if any.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Namespace qualifier, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Context qualifier, if any.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |p: &Option<String>| p.clone().unwrap_or_else(|| "-".into());
        write!(
            f,
            "{}[namespace={}, context={}]",
            part(&self.path),
            part(&self.namespace),
            part(&self.context)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use proptest::prelude::*;
    use test_case::test_case;

    fn hash_of(key: &CacheKey) -> u64 {
        let mut h = DefaultHasher::new();
        key.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_builder_matches_new() {
        let built = CacheKey::for_path("/book/show")
            .with_namespace("shop")
            .with_context("book");
        assert_eq!(built, CacheKey::new(Some("/book/show"), Some("shop"), Some("book")));
        assert_eq!(built.namespace(), Some("shop"));
    }

    #[test_case(CacheKey::new(Some("/a"), None, None), CacheKey::new(Some("/a"), Some(""), None) ; "absent vs empty namespace")]
    #[test_case(CacheKey::new(Some("/a"), None, None), CacheKey::new(None, None, Some("/a")) ; "path vs context")]
    #[test_case(CacheKey::new(None, None, None), CacheKey::new(None, None, Some("")) ; "all absent vs empty context")]
    fn test_absence_is_part_of_identity(a: CacheKey, b: CacheKey) {
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_marks_absent_fields() {
        let key = CacheKey::for_path("/x");
        assert_eq!(key.to_string(), "/x[namespace=-, context=-]");
    }

    fn opt_field() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[a-z/]{0,6}")
    }

    proptest! {
        #[test]
        fn prop_equal_keys_hash_equal(p in opt_field(), n in opt_field(), c in opt_field()) {
            let a = CacheKey { path: p.clone(), namespace: n.clone(), context: c.clone() };
            let b = CacheKey { path: p, namespace: n, context: c };
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }

        #[test]
        fn prop_serde_preserves_identity(p in opt_field(), n in opt_field(), c in opt_field()) {
            let key = CacheKey { path: p, namespace: n, context: c };
            let json = serde_json::to_string(&key).unwrap();
            let back: CacheKey = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(key, back);
        }
    }
}
