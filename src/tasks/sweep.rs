//! Expired Record Sweep Task
//!
//! Background task that periodically deletes expired records from a file
//! backend. Reads already ignore expired records; the sweep only reclaims
//! disk space for keys nobody reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::FileBackend;

/// Spawns a background task that periodically purges expired records.
///
/// The directory walk is blocking I/O, so each pass runs on tokio's
/// blocking pool. A failed pass is logged and the loop keeps going.
///
/// # Arguments
/// * `backend` - File backend whose tree is swept
/// * `sweep_interval_secs` - Interval in seconds between passes
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let backend = Arc::new(FileBackend::new("storage/cache", "cache"));
/// let sweep_handle = spawn_sweep_task(backend.clone(), 60);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(backend: Arc<FileBackend>, sweep_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            root = %backend.root().display(),
            "Starting expired record sweep with interval of {} seconds",
            sweep_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let target = Arc::clone(&backend);
            match tokio::task::spawn_blocking(move || target.purge_expired()).await {
                Ok(Ok(removed)) if removed > 0 => {
                    info!("Sweep: removed {} expired records", removed)
                }
                Ok(Ok(_)) => debug!("Sweep: no expired records found"),
                Ok(Err(e)) => warn!(error = %e, "Sweep failed"),
                Err(e) => warn!(error = %e, "Sweep task panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, NEVER_EXPIRE};
    use tempfile::TempDir;

    fn backend() -> (TempDir, Arc<FileBackend>) {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FileBackend::new(dir.path().join("cache"), "cache"));
        (dir, backend)
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_records() {
        let (_dir, backend) = backend();
        backend.set("expire_soon", b"value", 1).unwrap();
        let path = backend.record_path("expire_soon").unwrap();
        assert!(path.is_file());

        let handle = spawn_sweep_task(backend.clone(), 1);

        // Wait for the record to expire and a pass to run
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert!(!path.exists(), "Expired record should have been swept");
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_live_records() {
        let (_dir, backend) = backend();
        backend.set("long_lived", b"value", 3600).unwrap();
        backend.set("forever", b"value", NEVER_EXPIRE).unwrap();

        let handle = spawn_sweep_task(backend.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(backend.get("long_lived").unwrap(), Some(b"value".to_vec()));
        assert_eq!(backend.get("forever").unwrap(), Some(b"value".to_vec()));
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let (_dir, backend) = backend();
        let handle = spawn_sweep_task(backend, 1);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
