//! Memoizing TTL cache with in-flight request coalescing.
//!
//! Every key is in one of three states:
//!
//! - **Absent**: nothing stored, nothing running
//! - **InFlight**: an operation is running and callers join it
//! - **Cached**: a value is stored until its expiry instant
//!
//! The entry map and the in-flight map live behind one lock, so the
//! "look up, else join, else register" decision is atomic and at most one
//! operation per key is ever in flight.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;
use tracing::{debug, instrument, trace, warn, Instrument};

use agenda_core::{CacheError, Clock, MonotonicClock, Ttl};

use crate::config::CacheConfig;
use crate::stats::{CacheStats, Counters};

type SharedOperation<V, E> = Shared<BoxFuture<'static, Result<V, Arc<E>>>>;

/// Stored value with its expiry.
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    /// `None` when `inserted_at + ttl` overflows; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Operation registered for a key.
struct InFlight<V, E> {
    id: u64,
    operation: SharedOperation<V, E>,
}

struct Store<V, E> {
    entries: HashMap<String, CacheEntry<V>>,
    in_flight: HashMap<String, InFlight<V, E>>,
}

struct Inner<V, E> {
    store: RwLock<Store<V, E>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    counters: Counters,
    next_operation: AtomicU64,
}

/// In-memory memoizing cache.
///
/// Values of type `V` are cached per string key with a TTL. Operations that
/// fail with `E` are never cached; their error is shared by every caller that
/// was waiting on them.
///
/// Cloning is cheap and yields a handle onto the same store, so one instance
/// can be built at startup and handed to every consumer.
///
/// # Thread Safety
///
/// All operations are thread-safe. `get_or_compute` registers its in-flight
/// marker while holding the store lock and before its first `.await`, so a
/// concurrent call for the same key always joins instead of starting a
/// duplicate operation.
pub struct MemoCache<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for MemoCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> MemoCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a cache with the default configuration and a monotonic clock.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Creates a cache with custom configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    /// Creates a cache that reads time from `clock`.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: RwLock::new(Store {
                    entries: HashMap::new(),
                    in_flight: HashMap::new(),
                }),
                config,
                clock,
                counters: Counters::default(),
                next_operation: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the cached value for `key` if it has not expired.
    ///
    /// A stale entry is evicted as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.inner.clock.now();
        {
            let store = self.inner.store.read();
            match store.entries.get(key) {
                Some(entry) if entry.is_fresh(now) => {
                    Counters::bump(&self.inner.counters.hits);
                    return Some(entry.value.clone());
                }
                None => {
                    Counters::bump(&self.inner.counters.misses);
                    return None;
                }
                Some(_) => {}
            }
        }

        // Stale under the read lock; re-check under the write lock since a
        // concurrent `set` may have replaced it.
        let mut store = self.inner.store.write();
        self.inner.lookup(&mut store, key, now)
    }

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// The entry expires at `now + ttl`. A zero or negative TTL stores a value
    /// that is already stale on the next read.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: impl Into<Ttl>) {
        let now = self.inner.clock.now();
        let mut store = self.inner.store.write();
        self.inner.insert(&mut store, key.into(), value, ttl.into(), now);
    }

    /// Stores `value` with the configured default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.inner.config.default_ttl);
    }

    /// Returns the cached value for `key`, computing it at most once.
    ///
    /// 1. A fresh entry is returned without calling `operation`.
    /// 2. If an operation for `key` is already running, this call waits for
    ///    it and observes the same outcome.
    /// 3. Otherwise `operation` is registered and run. Success is stored with
    ///    `ttl`; failure is stored nowhere and reaches every joined caller.
    ///
    /// Inside a Tokio runtime the operation is driven by a background task,
    /// so it settles, caches its value and clears its marker even if every
    /// caller stops waiting (e.g. a caller-side `timeout`). Outside a runtime
    /// it is driven by whichever callers are polling it. Either way, dropping
    /// the returned future does not cancel the operation for other callers.
    ///
    /// An operation that panics leaves no marker behind; the panic is
    /// re-raised to the callers waiting on it.
    #[instrument(level = "debug", skip(self, operation, ttl))]
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        operation: F,
        ttl: impl Into<Ttl>,
    ) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let ttl = ttl.into();
        let (pending, started) = {
            let now = self.inner.clock.now();
            let mut store = self.inner.store.write();

            if let Some(value) = self.inner.lookup(&mut store, key, now) {
                return Ok(value);
            }

            if let Some(in_flight) = store.in_flight.get(key) {
                Counters::bump(&self.inner.counters.coalesced);
                debug!(operation = in_flight.id, "joining in-flight operation");
                (in_flight.operation.clone(), false)
            } else {
                let id = self.inner.next_operation.fetch_add(1, Ordering::Relaxed);
                let operation = Inner::start(&self.inner, key.to_owned(), id, operation, ttl);
                store.in_flight.insert(
                    key.to_owned(),
                    InFlight {
                        id,
                        operation: operation.clone(),
                    },
                );
                Counters::bump(&self.inner.counters.computed);
                debug!(operation = id, %ttl, "registered operation");
                (operation, true)
            }
        };

        if started {
            Inner::drive(&pending);
        }

        pending.await.map_err(CacheError::OperationFailed)
    }

    /// [`get_or_compute`](Self::get_or_compute) with the configured default TTL.
    pub async fn get_or_compute_default<F, Fut>(
        &self,
        key: &str,
        operation: F,
    ) -> Result<V, CacheError<E>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.get_or_compute(key, operation, self.inner.config.default_ttl)
            .await
    }

    /// Drops cached entries and in-flight markers.
    ///
    /// With `None` everything goes. With `Some(prefix)` only keys that start
    /// with `prefix` (exact, case-sensitive) are dropped. Callers already
    /// waiting on a dropped marker still receive their operation's outcome.
    ///
    /// Returns the number of cached entries removed.
    pub fn invalidate(&self, prefix: Option<&str>) -> usize {
        let mut store = self.inner.store.write();
        let before = store.entries.len();
        let markers_before = store.in_flight.len();

        match prefix {
            None => {
                store.entries.clear();
                store.in_flight.clear();
            }
            Some(prefix) => {
                store.entries.retain(|key, _| !key.starts_with(prefix));
                store.in_flight.retain(|key, _| !key.starts_with(prefix));
            }
        }

        let removed = before - store.entries.len();
        debug!(
            ?prefix,
            removed,
            markers = markers_before - store.in_flight.len(),
            "invalidated"
        );
        removed
    }

    /// Drops everything. Same as `invalidate(None)`.
    pub fn clear(&self) {
        self.invalidate(None);
    }

    /// Removes one key's entry and marker, returning the stored value if any.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut store = self.inner.store.write();
        store.in_flight.remove(key);
        store.entries.remove(key).map(|entry| entry.value)
    }

    /// Removes all expired entries and returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let mut store = self.inner.store.write();
        self.inner.purge_expired(&mut store, now)
    }

    /// Returns the number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.store.read().entries.len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.store.read().entries.is_empty()
    }

    /// Returns the number of keys with an operation in flight.
    pub fn in_flight_len(&self) -> usize {
        self.inner.store.read().in_flight.len()
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let now = self.inner.clock.now();
        let store = self.inner.store.read();
        let expired = store.entries.values().filter(|e| !e.is_fresh(now)).count();

        let mut stats = CacheStats {
            total_entries: store.entries.len(),
            expired_entries: expired,
            valid_entries: store.entries.len() - expired,
            in_flight: store.in_flight.len(),
            capacity: self.inner.config.max_entries,
            ..CacheStats::default()
        };
        self.inner.counters.fill(&mut stats);
        stats
    }
}

impl<V, E> Default for MemoCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> std::fmt::Debug for MemoCache<V, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.inner.store.read();
        f.debug_struct("MemoCache")
            .field("entries", &store.entries.len())
            .field("in_flight", &store.in_flight.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl<V, E> Inner<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Fresh value for `key`, evicting a stale entry.
    fn lookup(&self, store: &mut Store<V, E>, key: &str, now: Instant) -> Option<V> {
        match store.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => {
                Counters::bump(&self.counters.hits);
                Some(entry.value.clone())
            }
            Some(_) => {
                store.entries.remove(key);
                Counters::bump(&self.counters.expirations);
                Counters::bump(&self.counters.misses);
                trace!(key, "evicted stale entry");
                None
            }
            None => {
                Counters::bump(&self.counters.misses);
                None
            }
        }
    }

    fn insert(&self, store: &mut Store<V, E>, key: String, value: V, ttl: Ttl, now: Instant) {
        if let Some(max) = self.config.max_entries {
            if !store.entries.contains_key(&key) && store.entries.len() >= max {
                if self.config.auto_cleanup {
                    self.purge_expired(store, now);
                }
                if store.entries.len() >= max {
                    self.evict_oldest(store);
                }
            }
        }

        store.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now.checked_add(ttl.as_duration()),
            },
        );
    }

    fn purge_expired(&self, store: &mut Store<V, E>, now: Instant) -> usize {
        let before = store.entries.len();
        store.entries.retain(|_, entry| entry.is_fresh(now));
        let purged = before - store.entries.len();
        Counters::add(&self.counters.expirations, purged);
        purged
    }

    fn evict_oldest(&self, store: &mut Store<V, E>) {
        let oldest = store
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            store.entries.remove(&key);
            Counters::bump(&self.counters.evictions);
            trace!(key = %key, "evicted oldest entry at capacity");
        }
    }

    /// Wraps `operation` into the shared future stored as the in-flight marker.
    ///
    /// `operation` is only invoked on first poll, never under the store lock.
    /// The future holds a weak handle so an abandoned marker does not keep
    /// the cache alive. A panic clears the marker before it propagates.
    fn start<F, Fut>(
        this: &Arc<Self>,
        key: String,
        id: u64,
        operation: F,
        ttl: Ttl,
    ) -> SharedOperation<V, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let cache: Weak<Self> = Arc::downgrade(this);
        async move {
            let outcome = AssertUnwindSafe(async move { operation().await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => {
                    if let Some(cache) = cache.upgrade() {
                        cache.settle(&key, id, &result, ttl);
                    }
                    result.map_err(Arc::new)
                }
                Err(payload) => {
                    if let Some(cache) = cache.upgrade() {
                        cache.abandon(&key, id);
                    }
                    panic::resume_unwind(payload)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Polls `operation` to completion on the ambient Tokio runtime.
    fn drive(operation: &SharedOperation<V, E>) {
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(operation.clone().in_current_span());
        }
    }

    fn settle(&self, key: &str, id: u64, result: &Result<V, E>, ttl: Ttl) {
        let now = self.clock.now();
        let mut store = self.store.write();

        match result {
            Ok(value) => {
                self.insert(&mut store, key.to_owned(), value.clone(), ttl, now);
                debug!(key, operation = id, "operation settled, value cached");
            }
            Err(_) => {
                Counters::bump(&self.counters.failures);
                warn!(key, operation = id, "operation failed, nothing cached");
            }
        }

        Self::release(&mut store, key, id);
    }

    fn abandon(&self, key: &str, id: u64) {
        let mut store = self.store.write();
        Counters::bump(&self.counters.failures);
        warn!(key, operation = id, "operation panicked, nothing cached");
        Self::release(&mut store, key, id);
    }

    /// Only drops our own marker: after an invalidation a newer operation may
    /// already be registered under this key.
    fn release(store: &mut Store<V, E>, key: &str, id: u64) {
        if store.in_flight.get(key).is_some_and(|f| f.id == id) {
            store.in_flight.remove(key);
        }
    }
}
