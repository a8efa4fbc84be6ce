//! Work-tree comparisons: unstaged changes, staged changes, and the
//! combined per-path status.

use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use tracing::debug;
use vcs_hash::{Hasher, ObjectId};
use vcs_index::{EntryStatus, Stage, TreeItem};
use vcs_object::FileMode;
use vcs_repository::Repository;

use crate::rename::detect_renames;
use crate::tree::{build_file_diff, diff_maps, map_changes, Change};
use crate::{DiffOptions, FileDiff, FileStatus, Result};

/// Diff the index against the work tree (unstaged changes).
///
/// Untracked files are not part of this diff; see [`status`].
pub fn diff_index_to_worktree(repo: &Repository, opts: &DiffOptions) -> Result<Vec<FileDiff>> {
    let index = repo.index()?;
    let odb = repo.odb();
    let mut out = Vec::new();

    for entry in index.iter().filter(|e| e.stage == Stage::Normal) {
        if entry.mode == FileMode::Gitlink || repo.work_file_matches(&index, entry)? {
            continue;
        }
        let path = entry.path.clone();
        let old = TreeItem {
            oid: entry.oid,
            mode: entry.mode,
        };
        let old_data = odb.read_blob(&entry.oid)?.data;
        let diff = match repo.read_work_file(path.as_bstr())? {
            None => build_file_diff(Change::deleted(path, old), &old_data, &[], opts),
            Some(file) => {
                let new = TreeItem {
                    oid: Hasher::hash_object(repo.hash_algo(), "blob", &file.data)?,
                    mode: file.mode,
                };
                if new == old {
                    // Stat data was stale but content is the same.
                    continue;
                }
                build_file_diff(Change::modified(path, old, new), &old_data, &file.data, opts)
            }
        };
        out.push(diff);
    }
    debug!(files = out.len(), "diffed index against work tree");
    Ok(out)
}

/// Diff HEAD against the index (staged changes). An unborn HEAD counts as
/// the empty tree.
pub fn diff_head_to_index(repo: &Repository, opts: &DiffOptions) -> Result<Vec<FileDiff>> {
    let head = repo.head_paths()?;
    let index = repo.index()?.to_tree_items();
    diff_maps(repo.odb(), &head, &index, opts)
}

/// One path's state across HEAD, the index, and the work tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub path: BString,
    /// Staged blob, if the path is in the index.
    pub oid: Option<ObjectId>,
    pub mode: Option<FileMode>,
    /// Cached modification time (seconds) from the index.
    pub mtime: Option<u32>,
    /// Cached size from the index.
    pub size: Option<u64>,
    /// HEAD versus index.
    pub staged: Option<EntryStatus>,
    /// Index versus work tree.
    pub unstaged: Option<EntryStatus>,
    /// Source path when `staged` is a rename or copy.
    pub orig_path: Option<BString>,
}

impl StatusEntry {
    fn new(path: BString) -> Self {
        Self {
            path,
            oid: None,
            mode: None,
            mtime: None,
            size: None,
            staged: None,
            unstaged: None,
            orig_path: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.staged.is_none() && self.unstaged.is_none()
    }
}

fn slot<'a>(entries: &'a mut BTreeMap<BString, StatusEntry>, path: &BStr) -> &'a mut StatusEntry {
    entries
        .entry(path.to_owned())
        .or_insert_with(|| StatusEntry::new(path.to_owned()))
}

fn entry_status(status: FileStatus) -> EntryStatus {
    match status {
        FileStatus::Added => EntryStatus::Added,
        FileStatus::Deleted => EntryStatus::Deleted,
        FileStatus::Modified | FileStatus::TypeChanged => EntryStatus::Modified,
        FileStatus::Renamed => EntryStatus::Renamed,
        FileStatus::Copied => EntryStatus::Copied,
    }
}

/// Every path that differs anywhere, sorted by path. Clean paths are
/// omitted.
///
/// Unstaged modifications use the `(mtime, size)` shortcut and only hash
/// files whose stat data changed or is too recent to trust.
pub fn status(repo: &Repository, opts: &DiffOptions) -> Result<Vec<StatusEntry>> {
    let index = repo.index()?;
    let mut entries: BTreeMap<BString, StatusEntry> = BTreeMap::new();

    // HEAD versus index.
    let head = repo.head_paths()?;
    let changes = map_changes(&head, &index.to_tree_items());
    let changes = if opts.detect_renames {
        detect_renames(repo.odb(), changes, opts)?
    } else {
        changes
    };
    for change in changes {
        let e = slot(&mut entries, change.path());
        e.staged = Some(entry_status(change.status));
        if matches!(change.status, FileStatus::Renamed | FileStatus::Copied) {
            e.orig_path = change.old.map(|(p, _)| p);
        }
    }

    // Index versus work tree.
    for entry in index.iter() {
        if entry.stage != Stage::Normal {
            continue;
        }
        if entry.mode == FileMode::Gitlink || repo.work_file_matches(&index, entry)? {
            continue;
        }
        let unstaged = match repo.hash_work_file(entry.path.as_bstr())? {
            None => EntryStatus::Deleted,
            Some(item) if item.oid == entry.oid && item.mode == entry.mode => continue,
            Some(_) => EntryStatus::Modified,
        };
        slot(&mut entries, entry.path.as_bstr()).unstaged = Some(unstaged);
    }

    for path in index.conflicted_paths() {
        let e = slot(&mut entries, path.as_bstr());
        e.staged = Some(EntryStatus::Unmerged);
        e.unstaged = Some(EntryStatus::Unmerged);
    }

    for path in repo.scan_work_tree(BStr::new(""))? {
        if !index.contains_path(path.as_bstr()) {
            slot(&mut entries, path.as_bstr()).unstaged = Some(EntryStatus::Untracked);
        }
    }

    for (path, e) in entries.iter_mut() {
        if let Some(staged) = index.get(path.as_bstr(), Stage::Normal) {
            e.oid = Some(staged.oid);
            e.mode = Some(staged.mode);
            e.mtime = Some(staged.stat.mtime_secs);
            e.size = Some(u64::from(staged.stat.size));
        }
    }
    debug!(paths = entries.len(), "computed status");
    Ok(entries.into_values().collect())
}
