//! Cache configuration.

use serde::{Deserialize, Serialize};

use agenda_core::constants::{
    DEFAULT_MAX_ENTRIES, DEFAULT_TTL_MS, ENV_AUTO_CLEANUP, ENV_DEFAULT_TTL_MS, ENV_MAX_ENTRIES,
};
use agenda_core::{AgendaError, Result, Ttl};

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used by `set_default` and `get_or_compute_default`
    pub default_ttl: Ttl,
    /// Maximum number of stored entries; `None` means TTL is the only eviction
    pub max_entries: Option<usize>,
    /// Whether to purge expired entries before evicting live ones at capacity
    pub auto_cleanup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Ttl::from_millis(DEFAULT_TTL_MS),
            max_entries: DEFAULT_MAX_ENTRIES,
            auto_cleanup: true,
        }
    }
}

impl CacheConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default TTL.
    pub fn with_default_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.default_ttl = ttl.into();
        self
    }

    /// Bounds the number of stored entries. Zero means unbounded.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = (max_entries > 0).then_some(max_entries);
        self
    }

    /// Disables purge-on-insert of expired entries.
    pub fn no_auto_cleanup(mut self) -> Self {
        self.auto_cleanup = false;
        self
    }

    /// Reads overrides from `AGENDA_CACHE_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DEFAULT_TTL_MS) {
            let millis = raw.trim().parse::<i64>().map_err(|e| invalid(ENV_DEFAULT_TTL_MS, &raw, e))?;
            config.default_ttl = Ttl::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_MAX_ENTRIES) {
            let max = raw.trim().parse::<usize>().map_err(|e| invalid(ENV_MAX_ENTRIES, &raw, e))?;
            config = config.with_max_entries(max);
        }

        if let Some(raw) = lookup(ENV_AUTO_CLEANUP) {
            config.auto_cleanup = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(ENV_AUTO_CLEANUP, &raw, "expected a boolean")),
            };
        }

        Ok(config)
    }
}

fn invalid(name: &str, value: &str, reason: impl ToString) -> AgendaError {
    AgendaError::InvalidEnvVar {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
