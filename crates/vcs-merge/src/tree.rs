//! Three-way merge of whole snapshots.

use std::collections::{BTreeMap, BTreeSet};

use bstr::{BString, ByteSlice, ByteVec};
use tracing::debug;
use vcs_diff::{find_renames, DiffOptions};
use vcs_hash::ObjectId;
use vcs_index::{build_tree, flatten_tree, TreeItem};
use vcs_object::FileMode;
use vcs_odb::ObjectDatabase;
use vcs_repository::PathMap;
use vcs_utils::path::dirname;

use crate::content::{merge_content, ContentMerge, MergeLabels};
use crate::{ConflictEntry, ConflictKind, ConflictSide, MergeOptions, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeMergeResult {
    /// The merged tree, written only when nothing conflicted.
    pub tree: Option<ObjectId>,
    pub conflicts: Vec<ConflictEntry>,
    /// Every cleanly resolved path.
    pub entries: PathMap,
}

impl TreeMergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

type Side = Option<(BString, TreeItem)>;

/// One path of the result and the versions feeding it. A side's path
/// differs from the slot's when that side renamed the file.
#[derive(Debug, Default)]
struct Slot {
    base: Side,
    ours: Side,
    theirs: Side,
    /// Both sides brought unrelated files to this path: a rename on one
    /// side landed on an addition on the other.
    clash: Option<(BString, TreeItem)>,
}

fn flatten(odb: &ObjectDatabase, tree: Option<&ObjectId>) -> Result<PathMap> {
    Ok(match tree {
        Some(tree) => flatten_tree(odb, tree)?,
        None => PathMap::new(),
    })
}

fn side_at(map: &PathMap, path: &BString) -> Side {
    map.get(path).map(|item| (path.clone(), *item))
}

fn conflict_side(side: &Side) -> Option<ConflictSide> {
    side.as_ref().map(|(path, item)| ConflictSide::new(path, *item))
}

/// Merge `ours` and `theirs` against `base` (an empty tree when `None`).
pub fn merge_trees(
    odb: &ObjectDatabase,
    base: Option<&ObjectId>,
    ours: &ObjectId,
    theirs: &ObjectId,
    opts: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> Result<TreeMergeResult> {
    let base_map = flatten(odb, base)?;
    let our_map = flatten(odb, Some(ours))?;
    let their_map = flatten(odb, Some(theirs))?;

    let diff_opts = DiffOptions {
        rename_threshold: opts.rename_threshold,
        ..DiffOptions::default()
    };
    let renamed = |map: &PathMap| -> Result<BTreeMap<BString, BString>> {
        Ok(find_renames(odb, &base_map, map, &diff_opts)?
            .into_iter()
            .map(|r| (r.from, r.to))
            .collect())
    };
    let our_renames = renamed(&our_map)?;
    let their_renames = renamed(&their_map)?;

    let mut conflicts = Vec::new();
    let mut slots: BTreeMap<BString, Slot> = BTreeMap::new();
    let mut our_used = BTreeSet::new();
    let mut their_used = BTreeSet::new();

    for (path, item) in &base_map {
        let our_path = our_renames.get(path).unwrap_or(path);
        let their_path = their_renames.get(path).unwrap_or(path);
        let ours = side_at(&our_map, our_path);
        let theirs = side_at(&their_map, their_path);
        if ours.is_some() {
            our_used.insert(our_path.clone());
        }
        if theirs.is_some() {
            their_used.insert(their_path.clone());
        }
        let base = Some((path.clone(), *item));

        if our_path != path && their_path != path && our_path != their_path {
            conflicts.push(ConflictEntry {
                path: path.clone(),
                kind: ConflictKind::RenameRename,
                base: conflict_side(&base),
                ours: conflict_side(&ours),
                theirs: conflict_side(&theirs),
                merged: None,
            });
            continue;
        }
        let target = if our_path != path { our_path } else { their_path };
        slots.insert(target.clone(), Slot { base, ours, theirs, clash: None });
    }

    for (path, item) in our_map.iter().filter(|(p, _)| !our_used.contains(*p)) {
        let slot = slots.entry(path.clone()).or_default();
        if slot.ours.is_some() {
            slot.clash = Some((path.clone(), *item));
        } else {
            slot.ours = Some((path.clone(), *item));
        }
    }
    for (path, item) in their_map.iter().filter(|(p, _)| !their_used.contains(*p)) {
        let slot = slots.entry(path.clone()).or_default();
        if slot.theirs.is_some() {
            slot.clash = Some((path.clone(), *item));
        } else {
            slot.theirs = Some((path.clone(), *item));
        }
    }

    let mut entries = PathMap::new();
    for (path, slot) in slots {
        match resolve(odb, &path, slot, opts, labels)? {
            Resolution::Take(Some(item)) => {
                entries.insert(path, item);
            }
            Resolution::Take(None) => {}
            Resolution::Conflict(entry) => conflicts.push(entry),
        }
    }

    directory_file_conflicts(&mut entries, &mut conflicts, &our_map, labels);
    conflicts.sort_by(|a, b| a.path.cmp(&b.path));

    let tree = if conflicts.is_empty() {
        Some(build_tree(odb, &entries)?)
    } else {
        None
    };
    debug!(paths = entries.len(), conflicts = conflicts.len(), "merged trees");
    Ok(TreeMergeResult {
        tree,
        conflicts,
        entries,
    })
}

enum Resolution {
    Take(Option<TreeItem>),
    Conflict(ConflictEntry),
}

fn resolve(
    odb: &ObjectDatabase,
    path: &BString,
    slot: Slot,
    opts: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> Result<Resolution> {
    let conflict = |kind, merged| {
        Resolution::Conflict(ConflictEntry {
            path: path.clone(),
            kind,
            base: conflict_side(&slot.base),
            ours: conflict_side(&slot.ours),
            theirs: conflict_side(&slot.theirs),
            merged,
        })
    };

    if let Some((clash_path, item)) = &slot.clash {
        // The side whose own version still sits at its old path made the
        // addition; the other side renamed onto it.
        let added = Some(ConflictSide::new(clash_path, *item));
        let added_by_ours = slot.ours.as_ref().is_some_and(|(p, _)| p != path);
        let (ours, theirs) = if added_by_ours {
            (added, conflict_side(&slot.theirs))
        } else {
            (conflict_side(&slot.ours), added)
        };
        return Ok(Resolution::Conflict(ConflictEntry {
            path: path.clone(),
            kind: ConflictKind::AddAdd,
            base: None,
            ours,
            theirs,
            merged: None,
        }));
    }

    let base = slot.base.as_ref().map(|(_, i)| *i);
    let ours = slot.ours.as_ref().map(|(_, i)| *i);
    let theirs = slot.theirs.as_ref().map(|(_, i)| *i);

    // A rename against a deletion conflicts even when the content is
    // untouched.
    let renamed = [&slot.ours, &slot.theirs]
        .into_iter()
        .flatten()
        .any(|(p, _)| slot.base.as_ref().is_some_and(|(b, _)| b != p));
    if renamed && (ours.is_none() || theirs.is_none()) {
        return Ok(conflict(ConflictKind::RenameDelete, None));
    }

    if ours == theirs || base == theirs {
        return Ok(Resolution::Take(ours));
    }
    if base == ours {
        return Ok(Resolution::Take(theirs));
    }

    let (Some(o), Some(t)) = (ours, theirs) else {
        return Ok(conflict(ConflictKind::ModifyDelete, None));
    };

    let kind = if base.is_none() {
        ConflictKind::AddAdd
    } else {
        ConflictKind::Content
    };
    if !(o.mode.is_blob() && t.mode.is_blob()) || (o.mode == FileMode::Symlink) != (t.mode == FileMode::Symlink) {
        return Ok(conflict(kind, None));
    }

    let base_mode = base.map(|b| b.mode);
    let mode = if Some(o.mode) == base_mode {
        t.mode
    } else if Some(t.mode) == base_mode || o.mode == t.mode {
        o.mode
    } else {
        return Ok(conflict(kind, None));
    };

    let base_oid = base.map(|b| b.oid);
    let oid = if o.oid == t.oid || Some(t.oid) == base_oid {
        o.oid
    } else if Some(o.oid) == base_oid {
        t.oid
    } else if mode == FileMode::Symlink {
        return Ok(conflict(kind, None));
    } else {
        let base_data = match base_oid {
            Some(oid) => odb.read_blob(&oid)?.data,
            None => Vec::new(),
        };
        let our_data = odb.read_blob(&o.oid)?.data;
        let their_data = odb.read_blob(&t.oid)?.data;
        match merge_content(&base_data, &our_data, &their_data, opts, labels) {
            ContentMerge::Clean(data) if base.is_some() => odb.write_blob(&data)?,
            merged => {
                let oid = odb.write_blob(merged.content())?;
                return Ok(conflict(kind, Some(TreeItem { oid, mode })));
            }
        }
    };
    Ok(Resolution::Take(Some(TreeItem { oid, mode })))
}

/// A resolved file that is also the parent directory of another resolved
/// path moves aside to `path~label`, labelled by the side it came from.
fn directory_file_conflicts(
    entries: &mut PathMap,
    conflicts: &mut Vec<ConflictEntry>,
    our_map: &PathMap,
    labels: &MergeLabels<'_>,
) {
    let mut blocking = BTreeSet::new();
    for path in entries.keys() {
        let mut parent = dirname(path.as_bstr());
        while !parent.is_empty() {
            if entries.contains_key(parent) {
                blocking.insert(BString::from(parent));
            }
            parent = dirname(parent);
        }
    }

    for path in blocking {
        let Some(item) = entries.remove(&path) else {
            continue;
        };
        let ours_file = our_map.get(&path) == Some(&item);
        let mut moved = path.clone();
        moved.push_char('~');
        moved.push_str(if ours_file { labels.ours } else { labels.theirs });
        let side = Some(ConflictSide::new(&moved, item));
        conflicts.push(ConflictEntry {
            path,
            kind: ConflictKind::DirectoryFile,
            base: None,
            ours: if ours_file { side.clone() } else { None },
            theirs: if ours_file { None } else { side },
            merged: None,
        });
    }
}
