//! Configuration Module
//!
//! Handles loading cache configuration from environment variables and
//! turning it into a ready-to-use backend.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backend::{Backend, FileBackend, DEFAULT_EXTENSION};
use crate::cache::{Cache, DEFAULT_TTL};
use crate::error::{CacheError, Result};

// == Driver ==
/// Which storage backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// Records on the local filesystem
    File,
    /// A Redis server
    Redis,
}

impl FromStr for Driver {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Driver::File),
            "redis" => Ok(Driver::Redis),
            other => Err(CacheError::InvalidArgument(format!(
                "Unknown cache driver '{}'",
                other
            ))),
        }
    }
}

// == Redis Config ==
/// Connection settings for the Redis backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Logical database index selected after connecting
    pub database: i64,
    /// Keep one connection open for the backend's lifetime
    pub persistent: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            database: 0,
            persistent: false,
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend to construct
    pub driver: Driver,
    /// Root directory for the file backend
    pub cache_dir: PathBuf,
    /// Record file extension for the file backend
    pub file_ext: String,
    /// Default TTL in seconds when a write gives none (-1 = never expire)
    pub default_ttl: i64,
    /// Optional namespace prepended to generated keys
    pub identifier: Option<String>,
    /// Redis connection settings
    pub redis: RedisConfig,
    /// Seconds between background sweeps of expired file records
    pub sweep_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DRIVER` - `file` or `redis` (default: file)
    /// - `CACHE_DIR` - File backend root (default: storage/cache)
    /// - `CACHE_FILE_EXT` - Record file extension (default: cache)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 1800)
    /// - `CACHE_IDENTIFIER` - Key namespace (default: none)
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DATABASE`,
    ///   `REDIS_PERSISTENT` - Redis connection (default: 127.0.0.1:6379, db 0)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep frequency in seconds (default: 60)
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            driver: parsed("CACHE_DRIVER").unwrap_or(defaults.driver),
            cache_dir: env::var("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            file_ext: non_empty("CACHE_FILE_EXT").unwrap_or(defaults.file_ext),
            default_ttl: parsed("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            identifier: non_empty("CACHE_IDENTIFIER"),
            redis: RedisConfig {
                host: env::var("REDIS_HOST").unwrap_or(defaults.redis.host),
                port: parsed("REDIS_PORT").unwrap_or(defaults.redis.port),
                password: non_empty("REDIS_PASSWORD"),
                database: parsed("REDIS_DATABASE").unwrap_or(defaults.redis.database),
                persistent: parsed("REDIS_PERSISTENT").unwrap_or(defaults.redis.persistent),
            },
            sweep_interval: parsed("CACHE_SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
        }
    }

    // == Backend Construction ==
    /// The file backend described by this configuration.
    pub fn file_backend(&self) -> FileBackend {
        FileBackend::new(&self.cache_dir, &self.file_ext)
    }

    /// Builds the configured backend.
    pub fn open_backend(&self) -> Result<Box<dyn Backend>> {
        match self.driver {
            Driver::File => Ok(Box::new(self.file_backend())),
            #[cfg(feature = "redis-backend")]
            Driver::Redis => Ok(Box::new(crate::backend::RedisBackend::connect(&self.redis)?)),
            #[cfg(not(feature = "redis-backend"))]
            Driver::Redis => Err(CacheError::InvalidArgument(
                "Redis support is not compiled in (enable the `redis-backend` feature)"
                    .to_string(),
            )),
        }
    }

    /// Builds the configured backend wrapped in a [`Cache`] facade.
    pub fn open_cache(&self) -> Result<Cache<Box<dyn Backend>>> {
        let cache = Cache::new(self.open_backend()?).with_default_ttl(self.default_ttl)?;
        Ok(match &self.identifier {
            Some(identifier) => cache.with_identifier(identifier.clone()),
            None => cache,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: Driver::File,
            cache_dir: PathBuf::from("storage/cache"),
            file_ext: DEFAULT_EXTENSION.to_string(),
            default_ttl: DEFAULT_TTL,
            identifier: None,
            redis: RedisConfig::default(),
            sweep_interval: 60,
        }
    }
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}
