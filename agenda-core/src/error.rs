//! Error types for Agenda.
//!
//! The cache itself never invents failures: [`CacheError`] only ever wraps the
//! error returned by the operation it was asked to memoize. Everything outside
//! that contract (configuration, serialization, I/O) is an [`AgendaError`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias using `AgendaError`.
pub type Result<T> = std::result::Result<T, AgendaError>;

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure observed by a `get_or_compute` caller.
///
/// Every caller joined on the same in-flight operation receives a clone of the
/// same `Arc`, so the error is shared rather than copied.
#[derive(Debug)]
pub enum CacheError<E> {
    /// The wrapped operation returned an error.
    OperationFailed(Arc<E>),
}

impl<E> CacheError<E> {
    /// Borrows the error produced by the operation.
    pub fn operation_error(&self) -> &E {
        match self {
            CacheError::OperationFailed(err) => err,
        }
    }

    /// Returns the shared handle to the operation's error.
    pub fn into_shared(self) -> Arc<E> {
        match self {
            CacheError::OperationFailed(err) => err,
        }
    }

    /// Returns true if `other` carries the very same error instance.
    pub fn same_failure(&self, other: &CacheError<E>) -> bool {
        Arc::ptr_eq(self.shared(), other.shared())
    }

    fn shared(&self) -> &Arc<E> {
        match self {
            CacheError::OperationFailed(err) => err,
        }
    }
}

impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        CacheError::OperationFailed(Arc::clone(self.shared()))
    }
}

impl<E: fmt::Display> fmt::Display for CacheError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation failed: {}", self.operation_error())
    }
}

impl<E> std::error::Error for CacheError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.operation_error())
    }
}

impl<E> From<Arc<E>> for CacheError<E> {
    fn from(err: Arc<E>) -> Self {
        CacheError::OperationFailed(err)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AMBIENT ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for everything around the cache: configuration and tooling.
#[derive(Debug, Error)]
pub enum AgendaError {
    /// Configuration is inconsistent.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An environment variable held an unusable value.
    #[error("Invalid value '{value}' for {name}: {reason}")]
    InvalidEnvVar {
        /// Variable name
        name: String,
        /// Raw value found in the environment
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AgendaError {
    /// Returns true if this error comes from configuration input.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AgendaError::ConfigError(_) | AgendaError::InvalidEnvVar { .. }
        )
    }
}
