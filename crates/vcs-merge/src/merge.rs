//! Merging another branch into the current one.

use std::collections::BTreeSet;

use bstr::{BString, ByteSlice};
use tracing::{info, warn};
use vcs_hash::ObjectId;
use vcs_object::{Commit, Object};
use vcs_ref::{RefName, RefTransaction};
use vcs_repository::{PathMap, Repository};
use vcs_revwalk::{is_ancestor, merge_base, resolve_revision};

use crate::conflict::{work_paths, write_merge_result};
use crate::{merge_trees, rebase, ConflictEntry, MergeError, MergeLabels, MergeOptions, Result, TreeMergeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Their commit is already part of our history.
    UpToDate,
    FastForward { from: ObjectId, to: ObjectId },
    Merged { commit: ObjectId },
    /// Nothing was committed; the work tree and index hold the conflicts
    /// and `MERGE_HEAD` names their commit.
    Conflicted { conflicts: Vec<ConflictEntry> },
}

fn orig_head() -> Result<RefName> {
    Ok(RefName::new("ORIG_HEAD")?)
}

fn save_orig_head(repo: &Repository, head: ObjectId, reason: &str) -> Result<()> {
    let mut tx = RefTransaction::new();
    tx.force(orig_head()?, head, reason);
    repo.update_refs(tx, None)?;
    Ok(())
}

/// Merge `theirs_ref` (a branch, tag or commit id) into `HEAD`.
pub fn merge(repo: &Repository, theirs_ref: &str, opts: &MergeOptions) -> Result<MergeOutcome> {
    if repo.merge_head()?.is_some() {
        return Err(MergeError::MergeInProgress);
    }
    if rebase::rebase_in_progress(repo) {
        return Err(MergeError::RebaseInProgress);
    }

    let (theirs, their_commit) = repo.odb().peel_to_commit(&resolve_revision(repo, theirs_ref)?)?;
    let (head, head_commit) = repo.head_commit()?.ok_or(MergeError::UnbornHead)?;

    if is_ancestor(repo, &theirs, &head)? {
        info!(%theirs, "already up to date");
        return Ok(MergeOutcome::UpToDate);
    }
    if !opts.no_ff && is_ancestor(repo, &head, &theirs)? {
        save_orig_head(repo, head, &format!("merge {theirs_ref}: saving ORIG_HEAD"))?;
        repo.fast_forward(theirs, &format!("merge {theirs_ref}: Fast-forward"))?;
        info!(from = %head, to = %theirs, "fast-forwarded");
        return Ok(MergeOutcome::FastForward { from: head, to: theirs });
    }

    let base = match merge_base(repo, &head, &theirs)? {
        Some(base) => Some(repo.odb().read_commit(&base)?.tree),
        None if opts.allow_unrelated => None,
        None => return Err(MergeError::UnrelatedHistories),
    };
    let labels = MergeLabels {
        base: "merged common ancestors",
        ours: "HEAD",
        theirs: theirs_ref,
    };
    let result = merge_trees(repo.odb(), base.as_ref(), &head_commit.tree, &their_commit.tree, opts, &labels)?;
    let ours = repo.head_paths()?;
    check_local_changes(repo, &ours, &result)?;

    let Some(tree) = result.tree else {
        save_orig_head(repo, head, &format!("merge {theirs_ref}: saving ORIG_HEAD"))?;
        let paths = write_merge_result(repo, &ours, &result)?;
        let mut tx = RefTransaction::new();
        tx.force(RefName::new("MERGE_HEAD")?, theirs, format!("merge {theirs_ref}"));
        repo.update_refs(tx, None)?;

        let mut message = format!("Merge {theirs_ref}\n\n# Conflicts:\n");
        for path in &paths {
            message.push_str(&format!("#\t{path}\n"));
        }
        std::fs::write(repo.merge_msg_path(), message)?;
        warn!(conflicts = result.conflicts.len(), "merge stopped on conflicts");
        return Ok(MergeOutcome::Conflicted { conflicts: result.conflicts });
    };

    let signature = repo.signature()?;
    save_orig_head(repo, head, &format!("merge {theirs_ref}: saving ORIG_HEAD"))?;
    write_merge_result(repo, &ours, &result)?;
    let commit = Commit::new(tree, vec![head, theirs], signature.clone(), format!("Merge {theirs_ref}\n"));
    let oid = repo.odb().write(&Object::Commit(commit))?;

    let mut tx = RefTransaction::new();
    let target = repo.current_branch()?.unwrap_or_else(RefName::head);
    tx.update(target, head, oid, format!("merge {theirs_ref}: Merge made by the 'three-way' strategy."));
    repo.update_refs(tx, Some(&signature))?;
    info!(commit = %oid, %theirs, "merged");
    Ok(MergeOutcome::Merged { commit: oid })
}

/// Refuse to merge over staged changes, or over uncommitted or untracked
/// files at paths the merge would write.
fn check_local_changes(repo: &Repository, ours: &PathMap, result: &TreeMergeResult) -> Result<()> {
    let index = repo.index()?;
    let staged = index.to_tree_items();
    let mut blocked = index.conflicted_paths();
    blocked.extend(
        ours.keys()
            .chain(staged.keys())
            .filter(|p| ours.get(*p) != staged.get(*p))
            .cloned(),
    );

    let mut touched: BTreeSet<&BString> = ours
        .keys()
        .chain(result.entries.keys())
        .filter(|p| ours.get(*p) != result.entries.get(*p))
        .collect();
    for conflict in &result.conflicts {
        touched.insert(&conflict.path);
        touched.extend(work_paths(conflict));
    }

    for path in touched {
        let p = path.as_bstr();
        let clean = match index.entry(p) {
            Some(entry) => repo.work_file_matches(&index, entry)?,
            None => match repo.hash_work_file(p)? {
                Some(item) => result.entries.get(path) == Some(&item),
                None => true,
            },
        };
        if !clean {
            blocked.push(path.clone());
        }
    }

    blocked.sort();
    blocked.dedup();
    if blocked.is_empty() {
        Ok(())
    } else {
        Err(MergeError::LocalChanges(blocked))
    }
}

/// Give up on a conflicted merge: back to `ORIG_HEAD`, with the merge
/// state removed.
pub fn merge_abort(repo: &Repository) -> Result<()> {
    if repo.merge_head()?.is_none() {
        return Err(MergeError::NoMergeInProgress);
    }
    let orig = match repo.refs().resolve(&orig_head()?)? {
        Some(oid) => oid,
        None => repo.head_oid()?.ok_or(MergeError::UnbornHead)?,
    };
    let tree = repo.odb().read_commit(&orig)?.tree;
    repo.reset_hard(&tree)?;
    repo.clear_merge_state()?;
    info!(%orig, "merge aborted");
    Ok(())
}
