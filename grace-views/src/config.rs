//! Locator configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use grace_cache::CacheConfig;
use grace_core::error::{GraceError, Result};
use grace_core::{CACHE_FOREVER, DEFAULT_CACHE_TIMEOUT_MS};

/// Environment variable toggling view reloading.
pub const ENV_RELOAD_ENABLED: &str = "GRACE_RELOAD_ENABLED";
/// Environment variable setting the cache timeout in milliseconds.
pub const ENV_CACHE_TIMEOUT_MS: &str = "GRACE_CACHE_TIMEOUT_MS";

/// View locator configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Re-resolve views once the cache timeout elapses. When off, lookups
    /// are cached for the life of the process.
    pub reload_enabled: bool,
    /// Cache timeout in milliseconds while reloading is enabled.
    pub cache_timeout_millis: i64,
    /// Serve the previous lookup while another thread re-resolves it.
    pub tolerate_stale: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            reload_enabled: true,
            cache_timeout_millis: DEFAULT_CACHE_TIMEOUT_MS,
            tolerate_stale: true,
        }
    }
}

impl LocatorConfig {
    /// Configuration for deployed applications: resolve each view once.
    pub fn production() -> Self {
        Self {
            reload_enabled: false,
            ..Default::default()
        }
    }

    /// Timeout handed to the cache.
    pub fn effective_timeout_millis(&self) -> i64 {
        if self.reload_enabled {
            self.cache_timeout_millis
        } else {
            CACHE_FOREVER
        }
    }

    /// Cache configuration for this locator.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            timeout_millis: self.effective_timeout_millis(),
            tolerate_stale: self.tolerate_stale,
        }
    }

    /// Loads configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GraceError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Applies `GRACE_RELOAD_ENABLED` and `GRACE_CACHE_TIMEOUT_MS` on top of
    /// this configuration.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_RELOAD_ENABLED) {
            self.reload_enabled = parse_flag(&raw).ok_or_else(|| {
                GraceError::ConfigError(format!("{ENV_RELOAD_ENABLED}: expected a boolean, got '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup(ENV_CACHE_TIMEOUT_MS) {
            self.cache_timeout_millis = raw.trim().parse().map_err(|_| {
                GraceError::ConfigError(format!("{ENV_CACHE_TIMEOUT_MS}: expected milliseconds, got '{raw}'"))
            })?;
        }
        Ok(self)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
