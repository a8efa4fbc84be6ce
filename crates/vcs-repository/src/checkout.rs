//! Switching branches and resetting the work tree.

use std::collections::BTreeSet;

use bstr::{BStr, BString, ByteSlice};
use tracing::info;
use vcs_hash::ObjectId;
use vcs_index::{flatten_tree, Index, IndexEntry, TreeItem};
use vcs_ref::{RefName, RefTransaction};
use vcs_utils::path::dirname;

use crate::{PathMap, RepoError, Repository, Result};

fn stage_item(index: &Index, path: &BStr) -> Option<TreeItem> {
    index.entry(path).map(|e| TreeItem {
        oid: e.oid,
        mode: e.mode,
    })
}

/// What happens to `HEAD` once the work tree matches the target.
enum HeadMove<'a> {
    Attach(RefName),
    Detach,
    Advance { old: ObjectId, reason: &'a str },
}

impl Repository {
    /// Check out branch `name`.
    ///
    /// Only paths that differ between the current and the target commit are
    /// touched. If any of them carries uncommitted work, or an untracked
    /// file is in the way, nothing changes and the paths are reported.
    pub fn checkout(&self, name: &str) -> Result<()> {
        let branch = RefName::branch(name)?;
        let target = self
            .refs
            .resolve(&branch)?
            .ok_or_else(|| RepoError::BranchNotFound(name.to_owned()))?;
        self.switch_to(target, HeadMove::Attach(branch))
    }

    /// Check out a commit with a detached `HEAD`.
    pub fn checkout_detached(&self, commit: ObjectId) -> Result<()> {
        let (commit, _) = self.odb.peel_to_commit(&commit)?;
        self.switch_to(commit, HeadMove::Detach)
    }

    /// Move the current branch (or a detached `HEAD`) forward to `target`,
    /// updating the work tree the way [`checkout`](Self::checkout) does.
    /// The ref update is a compare-and-swap against the old tip.
    pub fn fast_forward(&self, target: ObjectId, reason: &str) -> Result<()> {
        let old = self.head_oid()?.ok_or(RepoError::UnbornHead)?;
        self.switch_to(target, HeadMove::Advance { old, reason })
    }

    fn switch_to(&self, target: ObjectId, head: HeadMove<'_>) -> Result<()> {
        let (commit, _) = self.odb.peel_to_commit(&target)?;
        let ours = self.head_paths()?;
        let theirs = self.commit_paths(&commit)?;
        let mut index = self.index()?;

        let changed: BTreeSet<&BString> = ours
            .keys()
            .chain(theirs.keys())
            .filter(|p| ours.get(*p) != theirs.get(*p))
            .collect();

        let blocked = self.overwritten_paths(&index, &ours, &theirs, &changed)?;
        if !blocked.is_empty() {
            return Err(RepoError::CheckoutConflict { paths: blocked });
        }

        for path in changed.iter().filter(|p| !theirs.contains_key(**p)) {
            if index.entry(path.as_bstr()).is_some() {
                self.remove_work_file(path.as_bstr())?;
            }
            index.remove_path(path.as_bstr());
        }
        for path in &changed {
            if let Some(item) = theirs.get(*path) {
                let stat = self.checkout_item(path.as_bstr(), item)?;
                index.add(IndexEntry::new(path.as_bstr(), item.oid, item.mode).with_stat(stat));
            }
        }
        self.write_index(&index)?;

        let mut tx = RefTransaction::new();
        match head {
            HeadMove::Attach(b) => {
                let message = format!("checkout: moving to {}", b.short_name());
                tx.set_symbolic(RefName::head(), b, message);
            }
            HeadMove::Detach => {
                tx.force(
                    RefName::head(),
                    commit,
                    format!("checkout: moving to {}", commit.to_short_hex(7)),
                );
            }
            HeadMove::Advance { old, reason } => {
                let target = self.current_branch()?.unwrap_or_else(RefName::head);
                tx.update(target, old, commit, reason);
            }
        }
        self.update_refs(tx, None)?;

        info!(target = %commit, changed = changed.len(), "checked out");
        Ok(())
    }

    /// Changed paths whose local state would be lost by moving from `ours`
    /// to `theirs`.
    fn overwritten_paths(
        &self,
        index: &Index,
        ours: &PathMap,
        theirs: &PathMap,
        changed: &BTreeSet<&BString>,
    ) -> Result<Vec<BString>> {
        let mut blocked = Vec::new();
        for &path in changed {
            let p = path.as_bstr();
            if index.stages(p).iter().any(|e| e.stage != vcs_index::Stage::Normal) {
                blocked.push(path.clone());
                continue;
            }
            let staged = stage_item(index, p);
            let target = theirs.get(path).copied();
            if staged != ours.get(path).copied() && staged != target {
                blocked.push(path.clone());
                continue;
            }
            match index.entry(p) {
                Some(entry) => {
                    if !self.work_file_matches(index, entry)? {
                        blocked.push(path.clone());
                    }
                }
                None => {
                    // Untracked content in the way of an incoming file.
                    if target.is_some() && self.hash_work_file(p)?.is_some_and(|item| Some(item) != target) {
                        blocked.push(path.clone());
                    }
                }
            }
        }

        // An untracked file where an incoming path needs a directory.
        for &path in changed.iter().filter(|p| theirs.contains_key(**p)) {
            let mut parent = dirname(path.as_bstr());
            while !parent.is_empty() {
                let leaving = ours.contains_key(parent) && !theirs.contains_key(parent);
                if !leaving && self.work_path(parent).is_file() {
                    blocked.push(path.clone());
                    break;
                }
                parent = dirname(parent);
            }
        }

        blocked.sort();
        blocked.dedup();
        Ok(blocked)
    }

    /// Make the index and work tree match `tree`, discarding changes to
    /// tracked files. Untracked files are left alone.
    pub fn reset_hard(&self, tree: &ObjectId) -> Result<()> {
        let target = flatten_tree(&self.odb, tree)?;
        let old = self.index()?;
        let head = self.head_paths()?;

        let tracked: BTreeSet<&BString> = old.iter().map(|e| &e.path).chain(head.keys()).collect();
        for path in tracked.iter().filter(|p| !target.contains_key(**p)) {
            self.remove_work_file(path.as_bstr())?;
        }

        let mut index = Index::new(self.algo);
        for (path, item) in &target {
            let keep = old
                .entry(path.as_bstr())
                .filter(|e| e.oid == item.oid && e.mode == item.mode);
            let intact = match keep {
                Some(e) => self.work_file_matches(&old, e)?,
                None => false,
            };
            let entry = match keep {
                Some(e) if intact => e.clone(),
                _ => {
                    let stat = self.checkout_item(path.as_bstr(), item)?;
                    IndexEntry::new(path.as_bstr(), item.oid, item.mode).with_stat(stat)
                }
            };
            index.add(entry);
        }
        self.write_index(&index)?;
        info!(%tree, paths = target.len(), "reset work tree");
        Ok(())
    }
}
