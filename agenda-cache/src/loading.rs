//! Namespaced cache bound to a [`Loader`].
//!
//! Data-access call sites usually cache one kind of record under a common key
//! prefix (`"staff:"`, `"booking:"`) and want to drop all of them at once after
//! a write. `LoadingCache` packages that pattern on top of a [`MemoCache`].

use std::sync::Arc;

use tracing::debug;

use agenda_core::{CacheError, Loader, Ttl};

use crate::cache::MemoCache;

/// Cache for one namespace of keys, filled by a [`Loader`].
///
/// Several loading caches may share the same [`MemoCache`] as long as their
/// namespaces do not overlap.
pub struct LoadingCache<L: Loader> {
    cache: MemoCache<L::Value, L::Error>,
    loader: Arc<L>,
    namespace: String,
    ttl: Ttl,
}

impl<L: Loader> Clone for LoadingCache<L> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            loader: Arc::clone(&self.loader),
            namespace: self.namespace.clone(),
            ttl: self.ttl,
        }
    }
}

impl<L: Loader> LoadingCache<L> {
    /// Creates a loading cache with its own default-configured store.
    pub fn new(loader: L, namespace: impl Into<String>) -> Self {
        Self::with_cache(MemoCache::new(), Arc::new(loader), namespace)
    }

    /// Creates a loading cache over an existing, possibly shared, store.
    ///
    /// Entries use the store's configured default TTL unless overridden with
    /// [`with_ttl`](Self::with_ttl).
    pub fn with_cache(
        cache: MemoCache<L::Value, L::Error>,
        loader: Arc<L>,
        namespace: impl Into<String>,
    ) -> Self {
        let ttl = cache.config().default_ttl;
        Self {
            cache,
            loader,
            namespace: namespace.into(),
            ttl,
        }
    }

    /// Overrides the TTL for entries loaded through this cache.
    pub fn with_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = ttl.into();
        self
    }

    /// Full cache key for `id`.
    pub fn key_for(&self, id: &str) -> String {
        format!("{}{}", self.namespace, id)
    }

    /// Returns the value for `id`, loading it if absent or stale.
    ///
    /// Concurrent fetches of the same id share one load.
    pub async fn fetch(&self, id: &str) -> Result<L::Value, CacheError<L::Error>> {
        let key = self.key_for(id);
        let loader = Arc::clone(&self.loader);
        let load_key = key.clone();

        self.cache
            .get_or_compute(&key, move || async move { loader.load(&load_key).await }, self.ttl)
            .await
    }

    /// Returns the cached value for `id` without loading.
    pub fn peek(&self, id: &str) -> Option<L::Value> {
        self.cache.get(&self.key_for(id))
    }

    /// Stores a value obtained elsewhere, e.g. the response of a write.
    pub fn prime(&self, id: &str, value: L::Value) {
        self.cache.set(self.key_for(id), value, self.ttl);
    }

    /// Drops the cached value for `id` and loads it again.
    pub async fn refresh(&self, id: &str) -> Result<L::Value, CacheError<L::Error>> {
        self.cache.remove(&self.key_for(id));
        self.fetch(id).await
    }

    /// Drops every entry in this namespace.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.cache.invalidate(Some(self.namespace.as_str()));
        debug!(namespace = %self.namespace, removed, "namespace invalidated");
        removed
    }

    /// The underlying store.
    pub fn cache(&self) -> &MemoCache<L::Value, L::Error> {
        &self.cache
    }

    /// Key prefix of this namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// TTL applied to loaded entries.
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }
}
