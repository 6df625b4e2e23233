//! Mini Cache - command line access to a cache directory or Redis database
//!
//! Reads its configuration from the environment (see [`Config::from_env`])
//! and runs one cache operation per invocation. `sweep --every` keeps
//! running until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mini_cache::config::{Config, Driver};
use mini_cache::{spawn_sweep_task, Cache, FileBackend};

#[derive(Parser, Debug)]
#[command(author, version, about = "File-backed cache with TTL records and atomic counters")]
struct Args {
    /// Backend driver, overriding CACHE_DRIVER
    #[arg(long)]
    driver: Option<Driver>,

    /// File backend root, overriding CACHE_DIR
    #[arg(long)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the value stored under a key
    Get { key: String },
    /// Store a value (parsed as JSON, otherwise taken as a string)
    Set {
        key: String,
        value: String,
        /// Seconds to live, -1 for never (default: CACHE_DEFAULT_TTL)
        #[arg(long, allow_hyphen_values = true)]
        ttl: Option<i64>,
    },
    /// Store a value without expiry unless the key is already live
    Setnx { key: String, value: String },
    /// Print remaining seconds (-1 never expires, -2 missing)
    Ttl { key: String },
    /// Add to a counter and print the new value
    Incr {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
    },
    /// Subtract from a counter and print the new value
    Decr {
        key: String,
        #[arg(long, default_value_t = 1)]
        by: i64,
    },
    /// Delete a key
    Rm { key: String },
    /// Delete every key starting with a prefix
    Clear { prefix: String },
    /// Delete every key
    Flush,
    /// Delete expired file records
    Sweep {
        /// Keep sweeping at this interval in seconds until interrupted
        #[arg(long)]
        every: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mini_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(driver) = args.driver {
        config.driver = driver;
    }
    if let Some(dir) = args.dir {
        config.cache_dir = dir;
    }

    match args.command {
        Command::Sweep { every } => sweep(&config, every).await,
        command => {
            let cache = config
                .open_cache()
                .with_context(|| format!("Failed to open {:?} cache", config.driver))?;
            run(&cache, command)
        }
    }
}

fn run<B: mini_cache::Backend>(cache: &Cache<B>, command: Command) -> Result<()> {
    match command {
        Command::Get { key } => match cache.get::<Value>(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },
        Command::Set { key, value, ttl } => {
            cache.set(&key, &parse_value(value), ttl)?;
            println!("OK");
        }
        Command::Setnx { key, value } => {
            let stored = cache.set_nx(&key, &parse_value(value))?;
            println!("{}", u8::from(stored));
        }
        Command::Ttl { key } => println!("{}", cache.ttl(&key)?),
        Command::Incr { key, by } => println!("{}", cache.increment(&key, by)?),
        Command::Decr { key, by } => println!("{}", cache.decrement(&key, by)?),
        Command::Rm { key } => println!("{}", u8::from(cache.remove(&key)?)),
        Command::Clear { prefix } => {
            if prefix.is_empty() {
                bail!("Refusing to clear an empty prefix, use `flush` instead");
            }
            cache.clear(&prefix)?;
            println!("OK");
        }
        Command::Flush => {
            cache.flush()?;
            println!("OK");
        }
        Command::Sweep { .. } => bail!("sweep runs against the backend, not the cache facade"),
    }
    Ok(())
}

/// JSON when it parses, otherwise the raw text.
fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

async fn sweep(config: &Config, every: Option<u64>) -> Result<()> {
    if config.driver != Driver::File {
        bail!("sweep only applies to the file driver; Redis expires keys itself");
    }
    let backend = Arc::new(config.file_backend());

    match every {
        None => {
            let removed = purge(&backend)?;
            println!("{}", removed);
        }
        Some(interval) => {
            let sweep_handle = spawn_sweep_task(backend, interval);
            info!("Background sweep started");
            shutdown_signal(sweep_handle).await;
        }
    }
    Ok(())
}

fn purge(backend: &FileBackend) -> Result<usize> {
    backend
        .purge_expired()
        .with_context(|| format!("Failed to sweep {}", backend.root().display()))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the sweep task.
async fn shutdown_signal(sweep_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping sweep...");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping sweep...");
        }
    }

    sweep_handle.abort();
    warn!("Sweep task aborted");
}
