//! Common traits for Agenda.
//!
//! These are the seams the cache is built around: where time comes from, and
//! where values come from.

use std::fmt::Debug;
use std::time::Instant;

use async_trait::async_trait;

// ═══════════════════════════════════════════════════════════════════════════════
// CLOCK TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Source of the current time.
///
/// The cache samples the clock once per call; expiry is always measured
/// against the value returned at that moment.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Fetches the value behind a cache key from its source of truth.
///
/// Implementations typically wrap a remote table read. The key passed in is
/// the full cache key, namespace prefix included.
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    /// Value produced by a successful load.
    type Value: Clone + Send + Sync + 'static;

    /// Error produced by a failed load.
    type Error: Send + Sync + 'static;

    /// Loads the value for `key`.
    async fn load(&self, key: &str) -> std::result::Result<Self::Value, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TableLoader {
        rows: HashMap<String, String>,
    }

    #[async_trait]
    impl Loader for TableLoader {
        type Value = String;
        type Error = String;

        async fn load(&self, key: &str) -> std::result::Result<String, String> {
            self.rows
                .get(key)
                .cloned()
                .ok_or_else(|| format!("no row for {key}"))
        }
    }

    #[tokio::test]
    async fn test_loader_object_safety() {
        let mut rows = HashMap::new();
        rows.insert("staff:7".to_string(), "Dana".to_string());
        let loader: Box<dyn Loader<Value = String, Error = String>> =
            Box::new(TableLoader { rows });

        assert_eq!(loader.load("staff:7").await.unwrap(), "Dana");
        assert_eq!(loader.load("staff:8").await.unwrap_err(), "no row for staff:8");
    }
}
