use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// Exclusive writer for a single mutable file (a ref, the index, the config).
///
/// Protocol:
/// - `<path>.lock` is created with `create_new`, so only one writer wins
/// - new contents are written into the lock file
/// - [`commit`](LockFile::commit) syncs and renames the lock over `<path>`
/// - dropping without committing removes the lock and leaves `<path>` untouched
///
/// Readers therefore see either the old or the new contents, never a mix.
pub struct LockFile {
    path: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl LockFile {
    /// Acquire the lock for `path`, creating parent directories as needed.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(lock_name);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    debug!(lock = %lock_path.display(), "lock already held");
                    UtilError::Lock(LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            committed: false,
        })
    }

    /// Like [`acquire`](LockFile::acquire) but returns `Ok(None)` when another
    /// writer holds the lock.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(path) {
            Ok(lock) => Ok(Some(lock)),
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Target path (without `.lock`).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the lock file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, sync, and atomically rename the lock over the target.
    pub fn commit(mut self) -> Result<()> {
        let commit_err = |path: &Path, source| {
            UtilError::Lock(LockError::Commit {
                path: path.to_path_buf(),
                source,
            })
        };

        if let Some(file) = self.file.as_mut() {
            file.flush().map_err(|e| commit_err(&self.lock_path, e))?;
            file.sync_all().map_err(|e| commit_err(&self.lock_path, e))?;
        }
        self.file.take();

        fs::rename(&self.lock_path, &self.path).map_err(|e| commit_err(&self.lock_path, e))?;
        self.committed = true;
        Ok(())
    }

    /// Remove the lock, leaving the target as it was.
    pub fn rollback(mut self) -> Result<()> {
        self.file.take();
        self.committed = true;
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Replace `path` with `contents` under a lock.
pub fn write_locked(path: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let mut lock = LockFile::acquire(path)?;
    lock.write_all(contents)?;
    lock.commit()
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
