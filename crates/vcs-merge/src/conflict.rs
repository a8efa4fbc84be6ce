//! Writing a tree merge into the index and work tree.

use std::collections::BTreeSet;

use bstr::{BString, ByteSlice};
use tracing::debug;
use vcs_index::{IndexEntry, Stage};
use vcs_repository::{PathMap, Repository};

use crate::{ConflictEntry, ConflictKind, ConflictSide, Result, TreeMergeResult};

/// Where each version of a conflict lives. Most conflicts keep every stage
/// at the entry's path; rename/rename and directory/file conflicts spread
/// them over the sides' own paths.
fn stage_paths(conflict: &ConflictEntry) -> Vec<(Stage, &BString, &ConflictSide)> {
    let spread = matches!(conflict.kind, ConflictKind::RenameRename | ConflictKind::DirectoryFile);
    [
        (Stage::Base, &conflict.base),
        (Stage::Ours, &conflict.ours),
        (Stage::Theirs, &conflict.theirs),
    ]
    .into_iter()
    .filter_map(|(stage, side)| {
        let side = side.as_ref()?;
        let path = if spread && stage != Stage::Base { &side.path } else { &conflict.path };
        Some((stage, path, side))
    })
    .collect()
}

/// Paths the work tree keeps a file at for `conflict`.
pub(crate) fn work_paths(conflict: &ConflictEntry) -> Vec<&BString> {
    match conflict.kind {
        ConflictKind::RenameRename | ConflictKind::DirectoryFile => [&conflict.ours, &conflict.theirs]
            .into_iter()
            .flatten()
            .map(|side| &side.path)
            .collect(),
        _ => vec![&conflict.path],
    }
}

/// Move the index and work tree from `ours` to the merge result: resolved
/// paths at stage 0, conflicts as stages 1-3 with the best available file
/// (marker content where there is some) in the work tree.
pub(crate) fn write_merge_result(
    repo: &Repository,
    ours: &PathMap,
    result: &TreeMergeResult,
) -> Result<Vec<BString>> {
    let mut index = repo.index()?;

    let mut kept: BTreeSet<&BString> = result.entries.keys().collect();
    for conflict in &result.conflicts {
        kept.extend(work_paths(conflict));
    }
    for path in ours.keys().filter(|p| !kept.contains(p)) {
        repo.remove_work_file(path.as_bstr())?;
        index.remove_path(path.as_bstr());
    }

    for (path, item) in &result.entries {
        let current = index.entry(path.as_bstr()).map(|e| (e.oid, e.mode));
        if ours.get(path) == Some(item) && current == Some((item.oid, item.mode)) {
            continue;
        }
        let stat = repo.checkout_item(path.as_bstr(), item)?;
        index.add(IndexEntry::new(path.as_bstr(), item.oid, item.mode).with_stat(stat));
    }

    let mut conflicted = BTreeSet::new();
    for conflict in &result.conflicts {
        let stages = stage_paths(conflict);
        for (_, path, _) in &stages {
            index.remove_path(path.as_bstr());
        }
        for (stage, path, side) in &stages {
            index.add(IndexEntry::new(path.as_bstr(), side.oid, side.mode).with_stage(*stage));
            conflicted.insert((*path).clone());
        }

        match (conflict.kind, &conflict.merged) {
            (ConflictKind::RenameRename | ConflictKind::DirectoryFile, _) => {
                for (stage, path, side) in &stages {
                    if *stage != Stage::Base {
                        repo.checkout_item(path.as_bstr(), &side.item())?;
                    }
                }
            }
            (_, Some(merged)) => {
                repo.checkout_item(conflict.path.as_bstr(), merged)?;
            }
            (_, None) => {
                if let Some(side) = conflict.ours.as_ref().or(conflict.theirs.as_ref()) {
                    repo.checkout_item(conflict.path.as_bstr(), &side.item())?;
                }
            }
        }
    }

    repo.write_index(&index)?;
    debug!(
        resolved = result.entries.len(),
        conflicted = conflicted.len(),
        "wrote merge result"
    );
    Ok(conflicted.into_iter().collect())
}
