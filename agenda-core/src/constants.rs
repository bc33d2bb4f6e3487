//! Defaults shared across the Agenda crates.

// ═══════════════════════════════════════════════════════════════════════════════
// EXPIRATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Default time-to-live applied by `set_default` and loading caches, in milliseconds.
pub const DEFAULT_TTL_MS: i64 = 60_000;

// ═══════════════════════════════════════════════════════════════════════════════
// CAPACITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Default entry bound. `None` means the cache only expires by TTL.
pub const DEFAULT_MAX_ENTRIES: Option<usize> = None;

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Prefix for every environment variable read by `CacheConfig::from_env`.
pub const ENV_PREFIX: &str = "AGENDA_CACHE_";

/// Environment variable holding the default TTL in milliseconds.
pub const ENV_DEFAULT_TTL_MS: &str = "AGENDA_CACHE_DEFAULT_TTL_MS";

/// Environment variable holding the maximum number of entries (`0` or unset = unbounded).
pub const ENV_MAX_ENTRIES: &str = "AGENDA_CACHE_MAX_ENTRIES";

/// Environment variable toggling purge-on-insert of expired entries.
pub const ENV_AUTO_CLEANUP: &str = "AGENDA_CACHE_AUTO_CLEANUP";
