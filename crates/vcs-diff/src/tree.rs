//! Snapshot-to-snapshot diff.

use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice, ByteVec};
use vcs_hash::ObjectId;
use vcs_index::TreeItem;
use vcs_object::{is_binary, FileMode, TreeEntry};
use vcs_odb::ObjectDatabase;
use vcs_repository::PathMap;

use crate::algorithm::diff_lines;
use crate::rename::detect_renames;
use crate::{DiffOptions, FileDiff, FileStatus, Hunk, Result};

/// A path-level change, before any content is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Change {
    pub status: FileStatus,
    pub old: Option<(BString, TreeItem)>,
    pub new: Option<(BString, TreeItem)>,
    pub similarity: Option<u8>,
}

impl Change {
    pub fn added(path: BString, item: TreeItem) -> Self {
        Self {
            status: FileStatus::Added,
            old: None,
            new: Some((path, item)),
            similarity: None,
        }
    }

    pub fn deleted(path: BString, item: TreeItem) -> Self {
        Self {
            status: FileStatus::Deleted,
            old: Some((path, item)),
            new: None,
            similarity: None,
        }
    }

    pub fn modified(path: BString, old: TreeItem, new: TreeItem) -> Self {
        let status = if kind(old.mode) == kind(new.mode) {
            FileStatus::Modified
        } else {
            FileStatus::TypeChanged
        };
        Self {
            status,
            old: Some((path.clone(), old)),
            new: Some((path, new)),
            similarity: None,
        }
    }

    pub fn path(&self) -> &BStr {
        self.new
            .as_ref()
            .or(self.old.as_ref())
            .map_or(BStr::new(""), |(p, _)| p.as_bstr())
    }
}

/// Files and executables are the same kind; symlinks and gitlinks are not.
fn kind(mode: FileMode) -> u8 {
    match mode {
        FileMode::Regular | FileMode::Executable => 0,
        FileMode::Symlink => 1,
        FileMode::Gitlink => 2,
        FileMode::Tree => 3,
    }
}

/// Hunks between two blobs' contents. Binary content yields none.
pub fn diff_blobs(old: &[u8], new: &[u8], opts: &DiffOptions) -> Vec<Hunk> {
    if is_binary(old) || is_binary(new) {
        return Vec::new();
    }
    diff_lines(old, new, opts)
}

/// Diff two trees. `None` stands for the empty tree.
pub fn diff_trees(
    odb: &ObjectDatabase,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
    opts: &DiffOptions,
) -> Result<Vec<FileDiff>> {
    let mut changes = Vec::new();
    walk(odb, old, new, BStr::new(""), &mut changes)?;
    finish(odb, changes, opts)
}

/// Diff two flattened snapshots, e.g. a commit and the index.
pub fn diff_maps(
    odb: &ObjectDatabase,
    old: &PathMap,
    new: &PathMap,
    opts: &DiffOptions,
) -> Result<Vec<FileDiff>> {
    finish(odb, map_changes(old, new), opts)
}

pub(crate) fn map_changes(old: &PathMap, new: &PathMap) -> Vec<Change> {
    let mut changes = Vec::new();
    for (path, item) in old {
        match new.get(path) {
            None => changes.push(Change::deleted(path.clone(), *item)),
            Some(other) if other != item => {
                changes.push(Change::modified(path.clone(), *item, *other))
            }
            Some(_) => {}
        }
    }
    for (path, item) in new {
        if !old.contains_key(path) {
            changes.push(Change::added(path.clone(), *item));
        }
    }
    changes
}

fn entries(odb: &ObjectDatabase, tree: Option<&ObjectId>) -> Result<BTreeMap<BString, TreeEntry>> {
    let Some(oid) = tree else {
        return Ok(BTreeMap::new());
    };
    Ok(odb
        .read_tree(oid)?
        .entries
        .into_iter()
        .map(|e| (e.name.clone(), e))
        .collect())
}

fn join(prefix: &BStr, name: &BStr) -> BString {
    let mut path = BString::from(prefix);
    if !path.is_empty() {
        path.push_byte(b'/');
    }
    path.push_str(name);
    path
}

/// Compare one directory level, descending only into subtrees whose ids
/// differ.
fn walk(
    odb: &ObjectDatabase,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
    prefix: &BStr,
    out: &mut Vec<Change>,
) -> Result<()> {
    if old == new {
        return Ok(());
    }
    let old_entries = entries(odb, old)?;
    let new_entries = entries(odb, new)?;

    let mut names: Vec<&BString> = old_entries.keys().chain(new_entries.keys()).collect();
    names.sort();
    names.dedup();

    for name in names {
        let path = join(prefix, name.as_bstr());
        let o = old_entries.get(name);
        let n = new_entries.get(name);
        let o_tree = o.filter(|e| e.mode.is_tree()).map(|e| &e.oid);
        let n_tree = n.filter(|e| e.mode.is_tree()).map(|e| &e.oid);
        let o_leaf = o.filter(|e| !e.mode.is_tree()).map(leaf);
        let n_leaf = n.filter(|e| !e.mode.is_tree()).map(leaf);

        if o_tree.is_some() || n_tree.is_some() {
            walk(odb, o_tree, n_tree, path.as_bstr(), out)?;
        }
        match (o_leaf, n_leaf) {
            (Some(a), Some(b)) if a != b => out.push(Change::modified(path, a, b)),
            (Some(a), None) => out.push(Change::deleted(path, a)),
            (None, Some(b)) => out.push(Change::added(path, b)),
            _ => {}
        }
    }
    Ok(())
}

fn leaf(entry: &TreeEntry) -> TreeItem {
    TreeItem {
        oid: entry.oid,
        mode: entry.mode,
    }
}

/// Pair renames, read contents, and sort by path.
pub(crate) fn finish(
    odb: &ObjectDatabase,
    changes: Vec<Change>,
    opts: &DiffOptions,
) -> Result<Vec<FileDiff>> {
    let changes = if opts.detect_renames {
        detect_renames(odb, changes, opts)?
    } else {
        changes
    };
    let mut out = changes
        .into_iter()
        .map(|c| file_diff(odb, c, opts))
        .collect::<Result<Vec<_>>>()?;
    out.sort_by(|a, b| a.new_path.cmp(&b.new_path).then(a.old_path.cmp(&b.old_path)));
    Ok(out)
}

fn content(odb: &ObjectDatabase, side: Option<&(BString, TreeItem)>) -> Result<Vec<u8>> {
    match side {
        Some((_, item)) if item.mode != FileMode::Gitlink => Ok(odb.read_blob(&item.oid)?.data),
        _ => Ok(Vec::new()),
    }
}

pub(crate) fn file_diff(odb: &ObjectDatabase, change: Change, opts: &DiffOptions) -> Result<FileDiff> {
    let old_data = content(odb, change.old.as_ref())?;
    let new_data = content(odb, change.new.as_ref())?;
    Ok(build_file_diff(change, &old_data, &new_data, opts))
}

/// Assemble a [`FileDiff`] once both sides' contents are known.
pub(crate) fn build_file_diff(
    change: Change,
    old_data: &[u8],
    new_data: &[u8],
    opts: &DiffOptions,
) -> FileDiff {
    let binary = is_binary(old_data) || is_binary(new_data);
    let same = change.old.as_ref().map(|(_, i)| i.oid) == change.new.as_ref().map(|(_, i)| i.oid);
    let hunks = if binary || same {
        Vec::new()
    } else {
        diff_lines(old_data, new_data, opts)
    };
    let path = change.path().to_owned();
    let (old_path, old_mode, old_oid) = match change.old {
        Some((p, item)) => (p, Some(item.mode), Some(item.oid)),
        None => (path.clone(), None, None),
    };
    let (new_path, new_mode, new_oid) = match change.new {
        Some((p, item)) => (p, Some(item.mode), Some(item.oid)),
        None => (path, None, None),
    };
    FileDiff {
        status: change.status,
        old_path,
        new_path,
        old_mode,
        new_mode,
        old_oid,
        new_oid,
        hunks,
        is_binary: binary,
        similarity: change.similarity,
    }
}
