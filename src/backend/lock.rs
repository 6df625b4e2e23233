//! Record Lock Module
//!
//! Advisory locks scoped to a single record file. At most one lock is held
//! per call and never across keys, so lock ordering cannot deadlock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{trace, warn};

use crate::backend::record::CacheRecord;
use crate::error::{CacheError, Result};

// == Record Lock ==
/// An open record file holding an advisory lock until dropped.
///
/// Dropping the guard releases the lock on every exit path, including
/// early returns through `?`.
#[derive(Debug)]
pub struct RecordLock {
    file: File,
    path: PathBuf,
}

impl RecordLock {
    // == Exclusive ==
    /// Opens (creating if needed) the record file and blocks until an
    /// exclusive lock is held. Missing parent directories are created.
    pub fn exclusive(path: &Path) -> Result<Self> {
        loop {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
            }

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| CacheError::io(path, e))?;

            if let Some(lock) = Self::hold(file, path, Mode::Exclusive)? {
                return Ok(lock);
            }
        }
    }

    // == Existing ==
    /// Exclusive lock on a record file that already exists.
    ///
    /// Returns `None` when there is no file; never creates one.
    pub fn existing(path: &Path) -> Result<Option<Self>> {
        loop {
            let file = match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(CacheError::io(path, e)),
            };

            if let Some(lock) = Self::hold(file, path, Mode::Exclusive)? {
                return Ok(Some(lock));
            }
        }
    }

    // == Shared ==
    /// Opens an existing record file for reading under a shared lock.
    ///
    /// Returns `None` when the file does not exist.
    pub fn shared(path: &Path) -> Result<Option<Self>> {
        loop {
            let file = match File::open(path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(CacheError::io(path, e)),
            };

            if let Some(lock) = Self::hold(file, path, Mode::Shared)? {
                return Ok(Some(lock));
            }
        }
    }

    /// Blocks for the lock, then checks that `path` still names the locked
    /// file. A record unlinked while we waited yields `None` so the caller
    /// reopens whatever is at `path` now.
    fn hold(file: File, path: &Path, mode: Mode) -> Result<Option<Self>> {
        let locked = match mode {
            Mode::Exclusive => FileExt::lock_exclusive(&file),
            Mode::Shared => FileExt::lock_shared(&file),
        };
        locked.map_err(|source| CacheError::Lock {
            path: path.to_path_buf(),
            source,
        })?;

        if !same_file(&file, path).map_err(|e| CacheError::io(path, e))? {
            trace!(path = %path.display(), "Record replaced while waiting for lock, reopening");
            let _ = FileExt::unlock(&file);
            return Ok(None);
        }

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    /// Path of the locked record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Read ==
    /// Reads and decodes the whole file.
    ///
    /// Empty or malformed content decodes to `None`.
    pub fn read(&mut self) -> Result<Option<CacheRecord>> {
        let mut content = Vec::new();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut content))
            .map_err(|e| CacheError::io(&self.path, e))?;

        if content.is_empty() {
            return Ok(None);
        }

        let record = CacheRecord::decode(&content);
        if record.is_none() {
            warn!(path = %self.path.display(), "Ignoring malformed cache record");
        }
        Ok(record)
    }

    // == Write ==
    /// Replaces the full file content with `record` (truncate, then write).
    pub fn write(&mut self, record: &CacheRecord) -> Result<()> {
        let bytes = record.encode();
        self.file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(&bytes))
            .and_then(|_| self.file.flush())
            .map_err(|e| CacheError::io(&self.path, e))
    }

    // == Remove ==
    /// Unlinks the record file while the lock is still held.
    ///
    /// Waiters on the old file notice the change and reopen.
    pub fn remove(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.path, e)),
        }
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Exclusive,
    Shared,
}

/// True if the open handle and `path` refer to the same inode.
#[cfg(unix)]
fn same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Open files cannot be unlinked here, so a held handle is still current.
#[cfg(not(unix))]
fn same_file(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
