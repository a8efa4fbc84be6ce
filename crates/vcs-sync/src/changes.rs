//! Exporting local history as a patch and applying patches from elsewhere.

use bstr::{BString, ByteSlice};
use tracing::{info, warn};
use vcs_diff::{
    apply_with, diff_trees, format_patch, parse_patch, ApplyOptions, DiffError, DiffOptions,
    FileDiff, Patch,
};
use vcs_hash::ObjectId;
use vcs_index::{IndexEntry, StatData};
use vcs_repository::Repository;
use vcs_revwalk::{commits_between, is_ancestor, merge_base, resolve_revision};

use crate::{Result, SyncError};

/// Everything `HEAD` has that `base` does not.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub base: ObjectId,
    pub head: ObjectId,
    /// Commits in `base..head`, oldest first.
    pub commits: Vec<ObjectId>,
    pub diffs: Vec<FileDiff>,
    /// `diffs` as a unified patch.
    pub patch: BString,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

/// Changes on `HEAD` since `since` (a ref name or commit id). If `since`
/// has moved on independently, the comparison starts from the merge base.
pub fn changes_since(repo: &Repository, since: &str) -> Result<ChangeSet> {
    let head = repo.head_oid()?.ok_or(SyncError::UnbornHead)?;
    let from = resolve_revision(repo, since)?;
    let base = if is_ancestor(repo, &from, &head)? {
        from
    } else {
        merge_base(repo, &from, &head)?
            .ok_or_else(|| SyncError::UnrelatedHistories(since.to_owned()))?
    };

    let commits = commits_between(repo, base, head)?
        .into_iter()
        .map(|e| e.oid)
        .collect::<Vec<_>>();
    let opts = DiffOptions::from_config(repo.config())?;
    let base_tree = repo.odb().read_commit(&base)?.tree;
    let head_tree = repo.odb().read_commit(&head)?.tree;
    let diffs = diff_trees(repo.odb(), Some(&base_tree), Some(&head_tree), &opts)?;
    let patch = format_patch(&diffs);

    info!(%base, %head, commits = commits.len(), files = diffs.len(), "collected changes");
    Ok(ChangeSet {
        base,
        head,
        commits,
        diffs,
        patch,
    })
}

/// Outcome of [`apply_changes`]. At most one of the lists is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Paths written (or that would be, on a dry run) and staged.
    pub applied: Vec<BString>,
    /// Paths whose local content the patch does not fit.
    pub conflicts: Vec<BString>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Apply a received patch to the work tree and stage every path it
/// touches. If any file does not fit, nothing is written and the report
/// lists the files that did not fit.
pub fn apply_changes(repo: &Repository, patch_text: &[u8], dry_run: bool) -> Result<ApplyReport> {
    let patch = parse_patch(patch_text)?;
    let opts = ApplyOptions {
        dry_run,
        ..ApplyOptions::from_config(repo.config())?
    };

    let applied = match apply_with(&patch, repo.work_tree(), &opts) {
        Ok(paths) => paths,
        Err(e) if is_mismatch(&e) => {
            let conflicts = conflicting_files(repo, &patch, &opts, e)?;
            warn!(conflicts = conflicts.len(), "received changes do not apply");
            return Ok(ApplyReport {
                applied: Vec::new(),
                conflicts,
            });
        }
        Err(e) => return Err(e.into()),
    };

    if !dry_run {
        stage(repo, &applied)?;
    }
    Ok(ApplyReport {
        applied,
        conflicts: Vec::new(),
    })
}

fn is_mismatch(e: &DiffError) -> bool {
    matches!(
        e,
        DiffError::PatchConflict { .. } | DiffError::MissingTarget(_) | DiffError::TargetExists(_)
    )
}

fn mismatch_path(e: DiffError) -> Option<BString> {
    match e {
        DiffError::PatchConflict { path, .. }
        | DiffError::MissingTarget(path)
        | DiffError::TargetExists(path) => Some(path),
        _ => None,
    }
}

/// Try each file of `patch` on its own to name every one that fails, not
/// just the first. `first` is the error the whole patch failed with.
fn conflicting_files(
    repo: &Repository,
    patch: &Patch,
    opts: &ApplyOptions,
    first: DiffError,
) -> Result<Vec<BString>> {
    let check = ApplyOptions { dry_run: true, ..*opts };
    let mut out = Vec::new();
    for file in &patch.files {
        let single = Patch {
            files: vec![file.clone()],
        };
        match apply_with(&single, repo.work_tree(), &check) {
            Ok(_) => {}
            Err(e) if is_mismatch(&e) => out.extend(mismatch_path(e)),
            Err(e) => return Err(e.into()),
        }
    }
    // A file may only fail in combination with an earlier one.
    if out.is_empty() {
        out.extend(mismatch_path(first));
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn stage(repo: &Repository, paths: &[BString]) -> Result<()> {
    let mut index = repo.index()?;
    for path in paths {
        match repo.read_work_file(path.as_bstr())? {
            Some(file) => {
                let oid = repo.odb().write_blob(&file.data)?;
                index.add(
                    IndexEntry::new(path.as_bstr(), oid, file.mode)
                        .with_stat(StatData::from_metadata(&file.meta)),
                );
            }
            None => {
                index.remove_path(path.as_bstr());
            }
        }
    }
    repo.write_index(&index)?;
    Ok(())
}
