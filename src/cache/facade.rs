//! Cache Facade Module
//!
//! Typed access on top of any [`Backend`]: values go through the payload
//! codec, missing TTLs fall back to a configured default and generated
//! keys carry the optional namespace.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{validate_ttl, Backend};
use crate::cache::{Payload, DEFAULT_TTL};
use crate::error::{CacheError, Result};
use crate::keys::{Arg, KeyGenerator};

// == Cache ==
/// Typed cache over a storage backend.
#[derive(Debug)]
pub struct Cache<B> {
    /// Storage the records live in
    backend: B,
    /// Key derivation for memoized calls
    keys: KeyGenerator,
    /// TTL applied when a write gives none
    default_ttl: i64,
}

impl<B: Backend> Cache<B> {
    // == Constructor ==
    /// Creates a facade with the default TTL and no key namespace.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            keys: KeyGenerator::new(),
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Replaces the default TTL.
    ///
    /// # Arguments
    /// * `ttl` - Seconds, or `-1` for records that never expire
    pub fn with_default_ttl(mut self, ttl: i64) -> Result<Self> {
        validate_ttl(ttl)?;
        self.default_ttl = ttl;
        Ok(self)
    }

    /// Prefixes every generated key with `@<identifier>/`.
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.keys = KeyGenerator::with_identifier(identifier);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn keys(&self) -> &KeyGenerator {
        &self.keys
    }

    pub fn default_ttl(&self) -> i64 {
        self.default_ttl
    }

    pub fn driver_name(&self) -> &'static str {
        self.backend.driver_name()
    }

    /// The key `call` would use for `operation` on a subject with this
    /// identity.
    pub fn key_for(&self, identity: &str, operation: &str, args: &[Arg]) -> String {
        self.keys.generate(identity, operation, args)
    }

    // == Get ==
    /// Returns the decoded value, or `None` if the key is absent or expired.
    ///
    /// Stored empty strings, `0` and `false` come back as `Some`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(bytes) => Ok(Some(Payload::from_bytes(bytes).decode()?)),
            None => Ok(None),
        }
    }

    // == Set ==
    /// Stores `value`, overwriting any existing record.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - Any serializable value
    /// * `ttl` - Seconds, `-1` for no expiry, or `None` for the default TTL
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<i64>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let payload = Payload::encode(value)?;
        self.backend.set(key, &payload.into_bytes(), ttl)
    }

    /// Evaluates `produce` and stores its result. Returns the stored value.
    pub fn set_with<T, F>(&self, key: &str, produce: F, ttl: Option<i64>) -> Result<T>
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        let value = produce();
        self.set(key, &value, ttl)?;
        Ok(value)
    }

    // == Set If Absent ==
    /// Stores `value` without expiry unless a live record exists.
    ///
    /// Returns `false`, leaving the record untouched, if one does.
    pub fn set_nx<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        let payload = Payload::encode(value)?;
        self.backend.set_nx(key, &payload.into_bytes())
    }

    /// Evaluates `produce` eagerly, then behaves as [`Cache::set_nx`].
    pub fn set_nx_with<T, F>(&self, key: &str, produce: F) -> Result<bool>
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        self.set_nx(key, &produce())
    }

    // == TTL ==
    /// `-1` never expires, `n >= 0` seconds remaining, `-2` missing.
    pub fn ttl(&self, key: &str) -> Result<i64> {
        self.backend.ttl(key)
    }

    // == Counters ==
    /// Adds `|step|` and returns the new value.
    pub fn increment(&self, key: &str, step: i64) -> Result<i64> {
        self.backend.increment(key, magnitude(step)?)
    }

    /// Subtracts `|step|` and returns the new value.
    pub fn decrement(&self, key: &str, step: i64) -> Result<i64> {
        self.backend.decrement(key, magnitude(step)?)
    }

    // == Remove ==
    /// Deletes the record. Returns `true` iff one existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.backend.remove(key)
    }

    // == Clear ==
    /// Deletes every record whose key starts with `prefix`.
    pub fn clear(&self, prefix: &str) -> Result<()> {
        self.backend.clear(prefix)
    }

    /// Deletes every record in the backend.
    pub fn flush(&self) -> Result<()> {
        self.backend.clear("")?;
        info!(driver = self.driver_name(), "Flushed cache");
        Ok(())
    }

    pub(crate) fn store_generated(&self, key: &str, value: &impl Serialize, ttl: Option<i64>) -> Result<()> {
        self.set(key, value, ttl)?;
        debug!(key, "Stored computed value");
        Ok(())
    }
}

fn magnitude(step: i64) -> Result<i64> {
    step.checked_abs()
        .ok_or_else(|| CacheError::InvalidArgument(format!("Step {} is out of range", step)))
}
