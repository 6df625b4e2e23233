//! File Backend Module
//!
//! Stores one record per key, one file per record, under a root directory.
//! Key segments map to directories, so `user/42/profile` lives at
//! `<root>/user/42/profile.<ext>`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::backend::{
    current_timestamp, validate_ttl, Backend, CacheRecord, RecordLock, MISSING, NEVER_EXPIRE,
};
use crate::error::{CacheError, Result};

/// Record suffix used when none is configured.
pub const DEFAULT_EXTENSION: &str = "cache";

// == File Backend ==
/// Filesystem-backed cache storage.
///
/// Counter updates and `set_nx` run under an exclusive lock on the single
/// record file they touch, which serializes them against every other
/// process sharing the directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    /// Directory holding all record files
    root: PathBuf,
    /// Record file suffix including the leading dot
    extension: String,
}

impl FileBackend {
    // == Constructor ==
    /// Creates a backend rooted at `root`.
    ///
    /// # Arguments
    /// * `root` - Directory for record files, created lazily on first write
    /// * `extension` - Record file suffix; a leading dot is optional and an
    ///   empty suffix falls back to `cache`
    ///
    /// Every record needs a suffix: a key and its fingerprinted variants
    /// (`op` and `op/<hash>`) map to `op.cache` and `op/<hash>.cache`,
    /// which could not coexist as a file and a directory named `op`.
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        let mut extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            warn!(fallback = DEFAULT_EXTENSION, "Empty record extension, using fallback");
            extension = DEFAULT_EXTENSION;
        }
        Self {
            root: root.into(),
            extension: format!(".{}", extension),
        }
    }

    /// Root directory of the record tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record file suffix, including the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    // == Key Mapping ==
    /// Maps a key to its record file path.
    ///
    /// Keys must be relative and may not walk out of the root.
    pub fn record_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.ends_with('/') {
            return Err(CacheError::InvalidArgument(format!(
                "Invalid cache key '{}'",
                key
            )));
        }
        check_relative(key)?;
        Ok(self.root.join(format!("{}{}", key, self.extension)))
    }

    // == Load ==
    /// Reads the record for `path` under a shared lock, if there is one.
    fn load(&self, path: &Path) -> Result<Option<CacheRecord>> {
        if !path.is_file() {
            return Ok(None);
        }
        match RecordLock::shared(path)? {
            Some(mut lock) => lock.read(),
            None => Ok(None),
        }
    }

    // == Purge If Expired ==
    /// Deletes the record at `path` if it is still expired once locked.
    ///
    /// The record is re-read under an exclusive lock and unlinked before
    /// the lock is released, so a writer that replaced it in the meantime
    /// keeps its value. Returns whether a file was removed.
    fn purge_if_expired(&self, path: &Path) -> Result<bool> {
        let Some(mut lock) = RecordLock::existing(path)? else {
            return Ok(false);
        };
        let expired = lock
            .read()?
            .is_some_and(|record| record.is_expired_at(current_timestamp()));
        if !expired {
            return Ok(false);
        }

        lock.remove()?;
        debug!(path = %path.display(), "Purged expired record");
        Ok(true)
    }

    /// Purge triggered by a read. The read already reports the key as
    /// absent, so a failure here is only logged.
    fn discard(&self, path: &Path) {
        if let Err(e) = self.purge_if_expired(path) {
            warn!(path = %path.display(), error = %e, "Failed to purge expired record");
        }
    }

    // == Purge Expired ==
    /// Walks the whole tree and deletes every expired record.
    ///
    /// Returns the number of records removed. Unreadable entries are
    /// skipped with a warning.
    pub fn purge_expired(&self) -> Result<usize> {
        if !self.root.exists() {
            return Ok(0);
        }

        let mut removed = 0;

        for entry in WalkDir::new(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cache entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.is_record_file(entry.path()) {
                continue;
            }

            match self.purge_if_expired(entry.path()) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable record");
                }
            }
        }

        debug!(removed, root = %self.root.display(), "Purged expired records");
        Ok(removed)
    }

    fn is_record_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&self.extension))
    }

    /// Key-space name of a directory entry: the file name without the
    /// record suffix. `None` for files that are not records.
    fn entry_key_name(&self, name: &str, is_dir: bool) -> Option<String> {
        if is_dir {
            return Some(name.to_string());
        }
        name.strip_suffix(&self.extension).map(str::to_string)
    }

    fn clear_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&self.root, e)),
        }
        fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        info!(root = %self.root.display(), "Cleared file cache");
        Ok(())
    }
}

impl Backend for FileBackend {
    fn driver_name(&self) -> &'static str {
        "file"
    }

    // == Get ==
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(key)?;
        match self.load(&path)? {
            Some(record) if record.is_expired() => {
                self.discard(&path);
                Ok(None)
            }
            Some(record) => Ok(Some(record.payload)),
            None => Ok(None),
        }
    }

    // == Set ==
    fn set(&self, key: &str, value: &[u8], ttl: i64) -> Result<()> {
        validate_ttl(ttl)?;
        let path = self.record_path(key)?;

        let mut lock = RecordLock::exclusive(&path)?;
        lock.write(&CacheRecord::new(value.to_vec(), ttl))?;

        debug!(key, ttl, bytes = value.len(), "Stored record");
        Ok(())
    }

    // == Set If Absent ==
    fn set_nx(&self, key: &str, value: &[u8]) -> Result<bool> {
        let path = self.record_path(key)?;
        let mut lock = RecordLock::exclusive(&path)?;

        let live = lock.read()?.filter(|record| !record.is_expired());
        if live.is_some() {
            return Ok(false);
        }

        lock.write(&CacheRecord::new(value.to_vec(), NEVER_EXPIRE))?;
        debug!(key, "Stored record (set_nx)");
        Ok(true)
    }

    // == Remove ==
    fn remove(&self, key: &str) -> Result<bool> {
        let path = self.record_path(key)?;
        match RecordLock::existing(&path)? {
            Some(lock) => {
                lock.remove()?;
                debug!(key, "Removed record");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Clear ==
    /// Deletes every record whose key starts with `prefix`.
    ///
    /// The prefix is split at its last `/`: the head names the directory
    /// to scan, the tail is matched against entry names in it. Whole
    /// subtrees are removed when a directory name matches.
    fn clear(&self, prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            return self.clear_all();
        }
        check_relative(prefix)?;

        let (dir, stem) = match prefix.rfind('/') {
            Some(idx) => (self.root.join(&prefix[..idx]), &prefix[idx + 1..]),
            None => (self.root.clone(), prefix),
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(&dir, e)),
        };

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&dir, e))?;
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .map_err(|e| CacheError::io(&path, e))?
                .is_dir();

            let name = entry.file_name();
            let matches = name
                .to_str()
                .and_then(|name| self.entry_key_name(name, is_dir))
                .is_some_and(|name| name.starts_with(stem));
            if !matches {
                continue;
            }

            let result = if is_dir {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(&path, e)),
            }
        }

        info!(prefix, removed, "Cleared records by prefix");
        Ok(())
    }

    // == TTL ==
    fn ttl(&self, key: &str) -> Result<i64> {
        let path = self.record_path(key)?;
        match self.load(&path)? {
            Some(record) => match record.remaining_at(current_timestamp()) {
                Some(ttl) => Ok(ttl),
                None => {
                    self.discard(&path);
                    Ok(MISSING)
                }
            },
            None => Ok(MISSING),
        }
    }

    // == Increment ==
    /// Read-modify-write under an exclusive lock on the record file.
    ///
    /// The lock is held from before the read until after the rewrite and is
    /// released when the guard drops, on success and on every error path.
    fn increment(&self, key: &str, step: i64) -> Result<i64> {
        let path = self.record_path(key)?;
        let mut lock = RecordLock::exclusive(&path)?;

        let now = current_timestamp();
        let (current, ttl) = match lock.read()? {
            Some(record) => match record.remaining_at(now) {
                Some(ttl) => (parse_integer(key, &record.payload)?, ttl),
                None => (0, NEVER_EXPIRE),
            },
            None => (0, NEVER_EXPIRE),
        };

        let next = current.checked_add(step).ok_or_else(|| {
            CacheError::InvalidArgument(format!(
                "Incrementing '{}' by {} overflows",
                key, step
            ))
        })?;

        lock.write(&CacheRecord::at(next.to_string().into_bytes(), ttl, now))?;
        debug!(key, step, value = next, "Updated counter");
        Ok(next)
    }
}

// == Helpers ==
fn check_relative(key: &str) -> Result<()> {
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || key.contains('\0') {
        return Err(CacheError::InvalidArgument(format!(
            "Cache key '{}' must be a relative path inside the cache root",
            key
        )));
    }
    Ok(())
}

fn parse_integer(key: &str, payload: &[u8]) -> Result<i64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|text| text.trim().parse::<i64>().ok())
        .ok_or_else(|| CacheError::NotAnInteger(key.to_string()))
}
