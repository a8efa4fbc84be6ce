//! Reading and writing files in the work tree.

use std::collections::BTreeSet;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice, ByteVec};
use vcs_hash::{Hasher, ObjectId};
use vcs_index::{mode_from_metadata, Index, IndexEntry, StatData, TreeItem};
use vcs_object::FileMode;
use vcs_utils::path::{to_os_path, REPO_DIR};

use crate::{Repository, Result};

/// A work-tree file as it would be staged.
#[derive(Debug)]
pub struct WorkFile {
    pub data: Vec<u8>,
    pub mode: FileMode,
    pub meta: Metadata,
}

impl Repository {
    pub fn work_path(&self, path: &BStr) -> PathBuf {
        to_os_path(&self.work_tree, path)
    }

    /// Content and mode of a work-tree file. Symlinks yield their target.
    /// Missing paths and directories are `None`.
    pub fn read_work_file(&self, path: &BStr) -> Result<Option<WorkFile>> {
        let full = self.work_path(path);
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            return Ok(None);
        }
        let data = if meta.file_type().is_symlink() {
            Vec::from_os_string(fs::read_link(&full)?.into_os_string()).unwrap_or_default()
        } else {
            fs::read(&full)?
        };
        let mode = mode_from_metadata(&meta);
        Ok(Some(WorkFile { data, mode, meta }))
    }

    /// Blob id and mode a work-tree file would get if staged, without
    /// storing anything.
    pub fn hash_work_file(&self, path: &BStr) -> Result<Option<TreeItem>> {
        let Some(file) = self.read_work_file(path)? else {
            return Ok(None);
        };
        let oid = Hasher::hash_object(self.algo, "blob", &file.data)?;
        Ok(Some(TreeItem {
            oid,
            mode: file.mode,
        }))
    }

    /// Whether the work-tree file still holds what `entry` records. Uses the
    /// stat shortcut when it is trustworthy and hashes otherwise.
    pub fn work_file_matches(&self, index: &Index, entry: &IndexEntry) -> Result<bool> {
        let full = self.work_path(entry.path.as_bstr());
        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if mode_from_metadata(&meta) != entry.mode {
            return Ok(false);
        }
        if index.stat_unchanged(entry, &meta) {
            return Ok(true);
        }
        Ok(self
            .hash_work_file(entry.path.as_bstr())?
            .is_some_and(|item| item.oid == entry.oid))
    }

    /// Write `data` to the work tree atomically, creating parent
    /// directories, and return the stat data to record in the index.
    pub fn write_work_file(&self, path: &BStr, data: &[u8], mode: FileMode) -> Result<StatData> {
        let full = self.work_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Ok(meta) = fs::symlink_metadata(&full) {
            if meta.file_type().is_symlink() || mode == FileMode::Symlink {
                fs::remove_file(&full)?;
            }
        }
        write_file(&full, data, mode)?;
        Ok(StatData::from_metadata(&fs::symlink_metadata(&full)?))
    }

    /// Check out one blob into the work tree.
    pub fn checkout_item(&self, path: &BStr, item: &TreeItem) -> Result<StatData> {
        let blob = self.odb.read_blob(&item.oid)?;
        self.write_work_file(path, &blob.data, item.mode)
    }

    /// Delete a work-tree file and any directories it leaves empty.
    pub fn remove_work_file(&self, path: &BStr) -> Result<()> {
        let full = self.work_path(path);
        match fs::remove_file(&full) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let mut dir = full.parent();
        while let Some(d) = dir {
            if d == self.work_tree || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    /// Every file and symlink in the work tree (or under `dir`), skipping
    /// the repository directory.
    pub fn scan_work_tree(&self, dir: &BStr) -> Result<BTreeSet<BString>> {
        let mut out = BTreeSet::new();
        let mut prefix = BString::from(dir);
        scan(&self.work_path(dir), &mut prefix, &mut out)?;
        Ok(out)
    }

    /// Stage the current content of `path`.
    pub(crate) fn stage_work_file(&self, index: &mut Index, path: &BStr, file: WorkFile) -> Result<ObjectId> {
        let oid = self.odb.write_blob(&file.data)?;
        index.add(
            IndexEntry::new(path, oid, file.mode).with_stat(StatData::from_metadata(&file.meta)),
        );
        Ok(oid)
    }
}

#[cfg(unix)]
fn write_file(full: &Path, data: &[u8], mode: FileMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if mode == FileMode::Symlink {
        std::os::unix::fs::symlink(data.to_os_str_lossy(), full)?;
        return Ok(());
    }
    vcs_utils::tempfile::write_atomic(full, data)?;
    let bits = if mode == FileMode::Executable { 0o755 } else { 0o644 };
    fs::set_permissions(full, fs::Permissions::from_mode(bits))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_file(full: &Path, data: &[u8], _mode: FileMode) -> Result<()> {
    vcs_utils::tempfile::write_atomic(full, data)?;
    Ok(())
}

fn scan(dir: &Path, prefix: &mut BString, out: &mut BTreeSet<BString>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if name == REPO_DIR {
            continue;
        }
        let Some(name) = <[u8]>::from_os_str(&name) else {
            continue;
        };
        let base = prefix.len();
        if base > 0 {
            prefix.push_byte(b'/');
        }
        prefix.push_str(name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            scan(&entry.path(), prefix, out)?;
        } else {
            out.insert(prefix.clone());
        }
        prefix.truncate(base);
    }
    Ok(())
}
