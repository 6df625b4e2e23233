//! Backend Module
//!
//! The storage contract every cache backend implements, plus the
//! filesystem and remote-store implementations.

mod file;
mod lock;
mod record;

#[cfg(feature = "redis-backend")]
mod redis;

use std::sync::Arc;

use crate::error::{CacheError, Result};

// Re-export public types
pub use file::{FileBackend, DEFAULT_EXTENSION};
pub use lock::RecordLock;
pub use record::{current_timestamp, CacheRecord, MAX_TTL};

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisBackend;

// == TTL Sentinels ==
/// TTL meaning "never expires", accepted by `set` and reported by `ttl`.
pub const NEVER_EXPIRE: i64 = -1;

/// TTL reported for a key that is absent or already expired.
pub const MISSING: i64 = -2;

// == Backend Trait ==
/// Storage contract shared by every backend.
///
/// Keys are `/`-separated strings. Values are opaque bytes; typing happens
/// in [`crate::cache::Cache`]. All calls are synchronous and run on the
/// caller's thread.
pub trait Backend: Send + Sync {
    /// Short lowercase name of the driver, e.g. `"file"`.
    fn driver_name(&self) -> &'static str;

    /// Returns the stored bytes, or `None` if absent or expired.
    ///
    /// Expired records are purged as a side effect.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` unconditionally. `ttl` is `-1` (never expire) or
    /// seconds from now.
    fn set(&self, key: &str, value: &[u8], ttl: i64) -> Result<()>;

    /// Stores `value` without expiry only if no live record exists.
    ///
    /// Returns `false` and leaves the existing record untouched otherwise.
    fn set_nx(&self, key: &str, value: &[u8]) -> Result<bool>;

    /// Deletes the record. Returns `true` iff one existed.
    fn remove(&self, key: &str) -> Result<bool>;

    /// Deletes every record whose key starts with `prefix`; `""` clears
    /// everything. Not atomic across the matched keys.
    fn clear(&self, prefix: &str) -> Result<()>;

    /// `-1` = never expires, `n >= 0` = seconds remaining, `-2` = missing.
    fn ttl(&self, key: &str) -> Result<i64>;

    /// Atomically adds `step` and returns the new value.
    ///
    /// An absent key counts as `0` and the new record never expires;
    /// a live record keeps its remaining TTL.
    fn increment(&self, key: &str, step: i64) -> Result<i64>;

    /// Same as `increment(key, -step)`.
    fn decrement(&self, key: &str, step: i64) -> Result<i64> {
        let step = step.checked_neg().ok_or_else(|| {
            CacheError::InvalidArgument(format!("Step {} cannot be negated", step))
        })?;
        self.increment(key, step)
    }
}

macro_rules! forward_backend {
    ($($ptr:ident),*) => {$(
        impl<B: Backend + ?Sized> Backend for $ptr<B> {
            fn driver_name(&self) -> &'static str {
                (**self).driver_name()
            }

            fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
                (**self).get(key)
            }

            fn set(&self, key: &str, value: &[u8], ttl: i64) -> Result<()> {
                (**self).set(key, value, ttl)
            }

            fn set_nx(&self, key: &str, value: &[u8]) -> Result<bool> {
                (**self).set_nx(key, value)
            }

            fn remove(&self, key: &str) -> Result<bool> {
                (**self).remove(key)
            }

            fn clear(&self, prefix: &str) -> Result<()> {
                (**self).clear(prefix)
            }

            fn ttl(&self, key: &str) -> Result<i64> {
                (**self).ttl(key)
            }

            fn increment(&self, key: &str, step: i64) -> Result<i64> {
                (**self).increment(key, step)
            }

            fn decrement(&self, key: &str, step: i64) -> Result<i64> {
                (**self).decrement(key, step)
            }
        }
    )*};
}

forward_backend!(Box, Arc);

// == Validation ==
/// Rejects TTLs other than `-1` or a non-negative count that fits the
/// fixed-width record field.
pub fn validate_ttl(ttl: i64) -> Result<()> {
    if ttl == NEVER_EXPIRE || (0..=MAX_TTL).contains(&ttl) {
        Ok(())
    } else {
        Err(CacheError::InvalidArgument(format!(
            "TTL must be -1 or between 0 and {} seconds, got {}",
            MAX_TTL, ttl
        )))
    }
}
