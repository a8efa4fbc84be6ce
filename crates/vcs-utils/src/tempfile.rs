use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::Result;

/// A file written in place next to its final destination and renamed over it.
///
/// Unlike [`LockFile`](crate::lockfile::LockFile) there is no exclusivity:
/// any number of writers may race, and the last rename wins. That is the
/// right contract for content-addressed objects and work-tree files, where
/// every racer writes the same bytes or the caller already holds a lock.
pub struct AtomicFile {
    inner: ::tempfile::NamedTempFile,
    target: PathBuf,
}

impl AtomicFile {
    /// Start writing a replacement for `target`.
    pub fn new(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let inner = ::tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&dir)?;
        Ok(Self { inner, target })
    }

    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Final destination.
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn file(&self) -> &fs::File {
        self.inner.as_file()
    }

    /// Flush and rename into place.
    pub fn persist(mut self) -> Result<()> {
        self.inner.flush()?;
        self.inner
            .persist(&self.target)
            .map_err(|e| crate::error::UtilError::Io(e.error))?;
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write `contents` to `target` via a sibling temp file and rename.
pub fn write_atomic(target: impl AsRef<Path>, contents: &[u8]) -> Result<()> {
    let mut file = AtomicFile::new(target)?;
    file.write_all(contents)?;
    file.persist()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpersisted_file_leaves_no_trace() {
        let dir = ::tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        {
            let mut f = AtomicFile::new(&target).unwrap();
            f.write_all(b"data").unwrap();
            assert!(f.path().exists());
        }
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn persist_overwrites() {
        let dir = ::tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/out.txt");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
    }
}
