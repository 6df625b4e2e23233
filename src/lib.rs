//! Mini Cache - A file-backed cache with memoization keys
//!
//! Provides TTL records on disk or in Redis, atomic counters, and
//! deterministic keys for caching the results of computations.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod tasks;

pub use backend::{Backend, FileBackend, MISSING, NEVER_EXPIRE};
pub use cache::{Cache, OperationTable, Subject};
pub use config::Config;
pub use error::{CacheError, Result};
pub use keys::{Arg, CallSite, KeyGenerator};
pub use tasks::spawn_sweep_task;
