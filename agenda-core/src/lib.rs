//! # Agenda Core
//!
//! Core types, errors, and traits shared by the Agenda cache crates.
//!
//! - **Types**: [`Ttl`], the non-negative time-to-live used by every cache call
//! - **Errors**: [`CacheError`] for wrapped operations, [`AgendaError`] for everything else
//! - **Clocks**: [`MonotonicClock`] for production, [`ManualClock`] for deterministic tests
//! - **Traits**: [`Clock`] and [`Loader`], the seams the cache is built around
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use agenda_core::Ttl;
//!
//! assert_eq!(Ttl::from_millis(-50), Ttl::ZERO);
//! assert_eq!(Ttl::from_millis(1500).as_duration(), Duration::from_millis(1500));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod clock;
pub mod constants;
pub mod error;
pub mod traits;
pub mod ttl;

pub use clock::{ManualClock, MonotonicClock};
pub use constants::*;
pub use error::{AgendaError, CacheError, Result};
pub use traits::{Clock, Loader};
pub use ttl::Ttl;
