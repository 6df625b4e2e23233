//! Redis Backend Module
//!
//! Forwards every operation to the equivalent Redis command. No local
//! locking: INCRBY, SETNX and friends are already atomic on the server.

use parking_lot::Mutex;
use redis::{Client, Commands, Connection, IntoConnectionInfo, RedisResult};
use tracing::{debug, info};

use crate::backend::{validate_ttl, Backend, NEVER_EXPIRE};
use crate::config::RedisConfig;
use crate::error::Result;

/// Keys deleted per DEL while clearing a prefix.
const CLEAR_BATCH: usize = 500;

// == Redis Backend ==
/// Cache storage on a Redis server.
pub struct RedisBackend {
    client: Client,
    /// Shared connection when configured as persistent; otherwise each
    /// call opens its own.
    persistent: Option<Mutex<Connection>>,
}

impl RedisBackend {
    // == Constructor ==
    /// Connects using the given settings.
    ///
    /// Persistent mode opens its connection eagerly so a bad address fails
    /// here rather than on first use.
    pub fn connect(config: &RedisConfig) -> Result<Self> {
        let mut info = format!(
            "redis://{}:{}/{}",
            config.host, config.port, config.database
        )
        .into_connection_info()?;
        info.redis.password = config.password.clone();

        let client = Client::open(info)?;
        let persistent = if config.persistent {
            Some(Mutex::new(client.get_connection()?))
        } else {
            None
        };

        info!(
            host = %config.host,
            port = config.port,
            database = config.database,
            persistent = config.persistent,
            "Connected to Redis"
        );
        Ok(Self { client, persistent })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> RedisResult<T>) -> Result<T> {
        match &self.persistent {
            Some(conn) => {
                let mut guard = conn.lock();
                Ok(op(&mut *guard)?)
            }
            None => {
                let mut conn = self.client.get_connection()?;
                Ok(op(&mut conn)?)
            }
        }
    }
}

impl Backend for RedisBackend {
    fn driver_name(&self) -> &'static str {
        "redis"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_connection(|con| con.get(key))
    }

    fn set(&self, key: &str, value: &[u8], ttl: i64) -> Result<()> {
        validate_ttl(ttl)?;
        self.with_connection(|con| match ttl {
            NEVER_EXPIRE => con.set(key, value),
            // SETEX rejects 0; a zero lifetime leaves nothing behind.
            0 => con.del(key),
            seconds => con.set_ex(key, value, seconds as u64),
        })
    }

    fn set_nx(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.with_connection(|con| con.set_nx(key, value))
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let deleted: i64 = self.with_connection(|con| con.del(key))?;
        Ok(deleted > 0)
    }

    /// SCAN-based prefix delete. Keys written while the scan runs may
    /// survive; an empty prefix flushes the selected database.
    fn clear(&self, prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            self.with_connection(|con| redis::cmd("FLUSHDB").query::<()>(con))?;
            info!("Flushed Redis database");
            return Ok(());
        }

        let pattern = glob_prefix(prefix);
        let removed = self.with_connection(|con| {
            let keys: Vec<Vec<u8>> = con.scan_match::<_, Vec<u8>>(&pattern)?.collect();
            let mut removed = 0i64;
            for batch in keys.chunks(CLEAR_BATCH) {
                removed += con.del::<_, i64>(batch)?;
            }
            Ok(removed)
        })?;

        debug!(prefix, removed, "Cleared Redis keys by prefix");
        Ok(())
    }

    fn ttl(&self, key: &str) -> Result<i64> {
        self.with_connection(|con| con.ttl(key))
    }

    fn increment(&self, key: &str, step: i64) -> Result<i64> {
        self.with_connection(|con| con.incr(key, step))
    }
}

/// Builds a SCAN MATCH pattern for keys starting with `prefix`, escaping
/// glob metacharacters in the prefix itself.
fn glob_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}
