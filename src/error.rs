//! Error types for the cache
//!
//! Provides unified error handling using thiserror.
//!
//! A missing or expired key is never an error: lookups report it through
//! `Option`, the `-2` TTL sentinel or a `false` return instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache backends and the facade.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A key, TTL or memoization argument was rejected before touching storage
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// `call` named an operation the subject never registered
    #[error("Unknown operation '{operation}' on {subject}")]
    UnknownOperation { subject: String, operation: String },

    /// A counter was applied to a record that does not hold an integer
    #[error("Value at key '{0}' is not an integer")]
    NotAnInteger(String),

    /// Filesystem failure while reading or writing a record
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The advisory lock on a record file could not be taken
    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote store rejected or failed a command
    #[cfg(feature = "redis-backend")]
    #[error("Remote store error: {0}")]
    Remote(#[from] redis::RedisError),

    /// A memoized operation failed while computing its value
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl CacheError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for faults of the storage medium itself, which callers may retry.
    pub fn is_operational(&self) -> bool {
        match self {
            CacheError::Io { .. } | CacheError::Lock { .. } => true,
            #[cfg(feature = "redis-backend")]
            CacheError::Remote(_) => true,
            _ => false,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
