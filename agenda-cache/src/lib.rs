//! # Agenda Cache
//!
//! Process-local memoizing cache for the data layer: values expire by TTL, and
//! concurrent requests for the same key share a single underlying fetch.
//!
//! ## Example
//!
//! ```rust
//! use agenda_cache::MemoCache;
//!
//! # async fn demo() -> Result<(), agenda_core::CacheError<std::io::Error>> {
//! let cache: MemoCache<String, std::io::Error> = MemoCache::new();
//!
//! let name = cache
//!     .get_or_compute("staff:7", || async { Ok("Dana".to_string()) }, 30_000)
//!     .await?;
//! assert_eq!(name, "Dana");
//! assert_eq!(cache.get("staff:7").as_deref(), Some("Dana"));
//!
//! cache.invalidate(Some("staff:"));
//! assert!(cache.get("staff:7").is_none());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod cache;
mod config;
mod loading;
mod stats;

pub use cache::MemoCache;
pub use config::CacheConfig;
pub use loading::LoadingCache;
pub use stats::CacheStats;

pub use agenda_core::{CacheError, Clock, Loader, ManualClock, MonotonicClock, Ttl};
