//! Memoization Module
//!
//! `remember` caches the result of a computation under an explicit key, a
//! call-site token, or a key derived from a subject, operation and
//! argument list.
//!
//! The check and the store are separate steps. Concurrent callers on a
//! cold key may both compute the value; the last write wins.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::keys::{identity_of, Arg, CallSite};

type Operation<S> = Box<dyn Fn(&S, &[Arg]) -> Result<Value> + Send + Sync>;

// == Operation Table ==
/// Named operations a [`Subject`] exposes to [`Cache::call`].
pub struct OperationTable<S> {
    operations: HashMap<String, Operation<S>>,
}

impl<S> OperationTable<S> {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Registers `operation` under `name`, replacing any earlier entry.
    pub fn register<F>(mut self, name: impl Into<String>, operation: F) -> Self
    where
        F: Fn(&S, &[Arg]) -> Result<Value> + Send + Sync + 'static,
    {
        self.operations.insert(name.into(), Box::new(operation));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the operation registered under `name`.
    pub fn invoke(&self, subject: &S, name: &str, args: &[Arg]) -> Result<Value> {
        match self.operations.get(name) {
            Some(operation) => operation(subject, args),
            None => Err(CacheError::UnknownOperation {
                subject: identity_of::<S>(),
                operation: name.to_string(),
            }),
        }
    }
}

impl<S> Default for OperationTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for OperationTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationTable")
            .field("operations", &self.names())
            .finish()
    }
}

// == Subject ==
/// A value whose operations can be memoized with [`Cache::call`].
pub trait Subject: Sized {
    /// Identity segment of generated keys. Defaults to the type path.
    fn identity(&self) -> String {
        identity_of::<Self>()
    }

    fn operations(&self) -> &OperationTable<Self>;
}

impl<B: Backend> Cache<B> {
    // == Remember ==
    /// Returns the live value under `key`, or computes, stores and
    /// returns it.
    ///
    /// A cached value that no longer decodes as `T` is recomputed.
    pub fn remember<T, F>(&self, key: &str, ttl: Option<i64>, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.try_remember(key, ttl, || Ok(compute()))
    }

    /// Like [`Cache::remember`] for computations that can fail. A failed
    /// computation stores nothing.
    pub fn try_remember<T, F>(&self, key: &str, ttl: Option<i64>, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.cached(key)? {
            return Ok(value);
        }
        let value = compute()?;
        self.store_generated(key, &value, ttl)?;
        Ok(value)
    }

    /// [`Cache::remember`] keyed by an explicit call-site token.
    pub fn remember_at<T, F>(&self, site: &CallSite, ttl: Option<i64>, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let key = self.keys().for_call_site(site);
        self.remember(&key, ttl, compute)
    }

    /// [`Cache::remember`] keyed by the caller's source file and line.
    #[track_caller]
    pub fn remember_here<T, F>(&self, ttl: Option<i64>, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let site = CallSite::here();
        self.remember_at(&site, ttl, compute)
    }

    // == Call ==
    /// Memoizes `operation` on `subject` with `args`.
    ///
    /// The key is derived from the subject's identity, the operation name
    /// and the argument fingerprint, so identical calls share one record.
    ///
    /// # Errors
    /// `UnknownOperation` if the subject never registered `operation`,
    /// before any storage is touched.
    pub fn call<S, T>(&self, subject: &S, operation: &str, ttl: Option<i64>, args: &[Arg]) -> Result<T>
    where
        S: Subject,
        T: DeserializeOwned,
    {
        let operations = subject.operations();
        if !operations.contains(operation) {
            return Err(CacheError::UnknownOperation {
                subject: subject.identity(),
                operation: operation.to_string(),
            });
        }

        let key = self.key_for(&subject.identity(), operation, args);
        let value: Value = self.try_remember(&key, ttl, || {
            operations.invoke(subject, operation, args)
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// Forgets what [`Cache::call`] cached for `operation` on `subject`.
    ///
    /// With arguments only that call's record goes; without, every
    /// fingerprinted variant of the operation goes too.
    pub fn forget_call<S: Subject>(&self, subject: &S, operation: &str, args: &[Arg]) -> Result<()> {
        let key = self.key_for(&subject.identity(), operation, args);
        if args.is_empty() {
            self.clear(&format!("{}/", key))?;
        }
        self.remove(&key)?;
        debug!(key = %key, "Forgot memoized call");
        Ok(())
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Err(CacheError::Serialization(e)) => {
                warn!(key, error = %e, "Cached value has an unexpected shape, recomputing");
                Ok(None)
            }
            other => other,
        }
    }
}
