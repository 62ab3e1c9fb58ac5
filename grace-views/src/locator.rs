//! Cached view lookup.

use tracing::{debug, info, instrument};

use grace_cache::{CacheStats, ExpiringCache, RefreshPolicy};
use grace_core::error::Result;
use grace_core::traits::PageResolver;
use grace_core::types::{CacheKey, PageSource};
use grace_core::{system_clock, SharedClock, PAGE_EXTENSION, TEMPLATE_PREFIX};

use crate::config::LocatorConfig;

/// Cache of lookups; `None` records a view that was not found.
pub type PageCache = ExpiringCache<CacheKey, Option<PageSource>>;

/// Turns a template name into its file name: `book/row` becomes `book/_row`.
pub fn template_uri(name: &str) -> String {
    let (dir, file) = match name.rfind('/') {
        Some(idx) => name.split_at(idx + 1),
        None => ("", name),
    };
    if file.starts_with(TEMPLATE_PREFIX) {
        name.to_string()
    } else {
        format!("{dir}{TEMPLATE_PREFIX}{file}")
    }
}

/// Appends the page extension when missing, so `show` and `show.gsp`
/// share a cache entry.
fn page_name(view: &str) -> String {
    let view = view.trim();
    if view.is_empty() || view.ends_with(PAGE_EXTENSION) {
        view.to_string()
    } else {
        format!("{view}{PAGE_EXTENSION}")
    }
}

/// Page lookups through an injected resolver, cached per key.
///
/// Misses are cached like hits. Precompiled pages never change once found,
/// so their entries are pinned and skip re-resolution.
pub struct CachingPageLocator<R> {
    resolver: R,
    cache: PageCache,
    config: LocatorConfig,
}

impl<R: PageResolver> CachingPageLocator<R> {
    /// Creates a locator on the system clock.
    pub fn new(resolver: R, config: LocatorConfig) -> Self {
        Self::with_clock(resolver, config, system_clock())
    }

    /// Creates a locator whose cache measures staleness on `clock`.
    pub fn with_clock(resolver: R, config: LocatorConfig, clock: SharedClock) -> Self {
        let cache = ExpiringCache::with_clock(config.cache_config(), clock).with_policy(
            RefreshPolicy::pin_when(|page: &Option<PageSource>, _: &()| {
                page.as_ref().is_some_and(PageSource::is_precompiled)
            }),
        );
        info!(
            reload = config.reload_enabled,
            timeout_ms = config.effective_timeout_millis(),
            "view locator ready"
        );
        Self {
            resolver,
            cache,
            config,
        }
    }

    /// Looks up `key`, resolving it when it is missing or stale.
    #[instrument(skip_all, fields(key = %key))]
    pub fn lookup(&self, key: CacheKey) -> Result<Option<PageSource>> {
        let page = self
            .cache
            .get_or_compute(key.clone(), || self.resolver.resolve(&key))?;
        Ok(page)
    }

    /// Finds a page by URI, optionally within a plugin namespace.
    pub fn find_page(&self, uri: &str, namespace: Option<&str>) -> Result<Option<PageSource>> {
        let name = page_name(uri);
        self.lookup(CacheKey::new(Some(&name), namespace, None))
    }

    /// Finds a controller view. Absolute view paths ignore the controller.
    pub fn find_view(
        &self,
        controller: Option<&str>,
        view: &str,
        namespace: Option<&str>,
    ) -> Result<Option<PageSource>> {
        let context = controller.filter(|_| !view.starts_with('/'));
        let name = page_name(view);
        self.lookup(CacheKey::new(Some(&name), namespace, context))
    }

    /// Finds a template (partial view); the last path segment gets the
    /// template prefix.
    pub fn find_template(
        &self,
        controller: Option<&str>,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<PageSource>> {
        self.find_view(controller, &template_uri(name), namespace)
    }

    /// Drops the cached lookup for `key`.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.cache.invalidate(key)
    }

    /// Drops every cached lookup.
    pub fn clear_cache(&self) {
        debug!(entries = self.cache.len(), "clearing view cache");
        self.cache.clear();
    }

    /// Cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The injected resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Locator configuration.
    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }
}
