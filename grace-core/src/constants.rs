//! Naming conventions and cache sentinels.

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE TIMEOUTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Timeout meaning "cache forever once initialized".
pub const CACHE_FOREVER: i64 = -1;

/// Timeout meaning "recompute on every call".
pub const CACHE_NEVER: i64 = 0;

/// Default cache timeout for reloadable view lookups (milliseconds).
pub const DEFAULT_CACHE_TIMEOUT_MS: i64 = 5_000;

/// Timestamp value of an entry that was never published or was force-expired.
pub const NEVER_PUBLISHED: i64 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW CONVENTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// File extension of server-side page templates.
pub const PAGE_EXTENSION: &str = ".gsp";

/// Prefix marking a template (partial view) file name.
pub const TEMPLATE_PREFIX: char = '_';

/// Directory holding application views under a search root.
pub const VIEWS_DIR: &str = "views";

/// Directory holding plugin trees under a search root.
pub const PLUGINS_DIR: &str = "plugins";

/// Separator between namespace and URI in precompiled registry keys.
pub const NAMESPACE_SEPARATOR: char = ':';
