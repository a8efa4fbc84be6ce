//! Rewriting commits on the current branch.
//!
//! Each operation replaces some commits on the first-parent chain and then
//! re-parents everything after them. The later commits keep their trees,
//! so no merging happens, and the branch tip moves with a compare-and-swap
//! against the tip it had when the rewrite began.

use std::collections::BTreeSet;
use std::path::Path;

use bstr::{BString, ByteSlice};
use tracing::info;
use vcs_hash::ObjectId;
use vcs_index::build_tree;
use vcs_object::{Commit, Object};
use vcs_ref::{RefName, RefTransaction};
use vcs_repository::{PathMap, Repository};
use vcs_revwalk::{log, LogEntry, LogOptions};

use crate::{MergeError, Result};

/// Paths for one commit of a split, with an optional message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SplitGroup {
    pub paths: Vec<BString>,
    pub message: Option<String>,
}

impl SplitGroup {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<BString>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

fn normalize(message: &str) -> String {
    format!("{}\n", message.trim_end())
}

/// `HEAD` and its first-parent ancestors, newest first.
fn first_parent_chain(repo: &Repository) -> Result<Vec<LogEntry>> {
    let head = repo
        .head_oid()?
        .ok_or_else(|| MergeError::InvalidRewrite("the current branch has no commits".into()))?;
    Ok(log(repo, head, None, &LogOptions { first_parent: true })?)
}

fn position(chain: &[LogEntry], commit: &ObjectId) -> Result<usize> {
    chain
        .iter()
        .position(|e| &e.oid == commit)
        .ok_or(MergeError::NotOnBranch(*commit))
}

/// Re-create `later` (newest first, as in the chain) on top of `base`.
/// Returns the new tip.
fn reparent(repo: &Repository, base: ObjectId, later: &[LogEntry]) -> Result<ObjectId> {
    let mut tip = base;
    for entry in later.iter().rev() {
        let mut commit = entry.commit.clone();
        match commit.parents.first_mut() {
            Some(first) => *first = tip,
            None => commit.parents.push(tip),
        }
        commit.gpgsig = None;
        tip = repo.odb().write(&Object::Commit(commit))?;
    }
    Ok(tip)
}

fn move_branch(repo: &Repository, old: ObjectId, new: ObjectId, reason: String) -> Result<()> {
    let mut tx = RefTransaction::new();
    let target = repo.current_branch()?.unwrap_or_else(RefName::head);
    tx.update(target, old, new, reason);
    repo.update_refs(tx, None)?;
    Ok(())
}

fn refuse_during_merge(repo: &Repository) -> Result<()> {
    if repo.merge_head()?.is_some() {
        return Err(MergeError::MergeInProgress);
    }
    if crate::rebase::rebase_in_progress(repo) {
        return Err(MergeError::RebaseInProgress);
    }
    Ok(())
}

/// Split `commit` into one commit per group. Changed paths no group names
/// go into a final extra commit. Returns the new commits, oldest first.
pub fn split(repo: &Repository, commit: &ObjectId, groups: &[SplitGroup]) -> Result<Vec<ObjectId>> {
    refuse_during_merge(repo)?;
    let chain = first_parent_chain(repo)?;
    let pos = position(&chain, commit)?;
    let target = &chain[pos].commit;
    if target.is_merge() {
        return Err(MergeError::InvalidRewrite(format!("{commit} is a merge commit")));
    }

    let mut state = match target.first_parent() {
        Some(parent) => repo.commit_paths(parent)?,
        None => PathMap::new(),
    };
    let after = repo.commit_paths(commit)?;
    let changed: BTreeSet<&BString> = state
        .keys()
        .chain(after.keys())
        .filter(|p| state.get(*p) != after.get(*p))
        .collect();

    let mut named = BTreeSet::new();
    for path in groups.iter().flat_map(|g| &g.paths) {
        if !changed.contains(path) {
            return Err(MergeError::InvalidRewrite(format!("{path} is not changed by {commit}")));
        }
        if !named.insert(path) {
            return Err(MergeError::InvalidRewrite(format!("{path} is named twice")));
        }
    }
    let mut groups: Vec<SplitGroup> = groups.iter().filter(|g| !g.paths.is_empty()).cloned().collect();
    let rest: Vec<BString> = changed.iter().filter(|p| !named.contains(*p)).map(|p| (*p).clone()).collect();
    if !rest.is_empty() {
        groups.push(SplitGroup::new(rest));
    }
    if groups.is_empty() {
        return Err(MergeError::InvalidRewrite(format!("{commit} changes nothing")));
    }

    let committer = repo.signature()?;
    let summary = target.summary().to_str_lossy().into_owned();
    let total = groups.len();
    let mut parent = target.first_parent().copied();
    let mut created = Vec::with_capacity(total);
    for (i, group) in groups.iter().enumerate() {
        for path in &group.paths {
            match after.get(path) {
                Some(item) => state.insert(path.clone(), *item),
                None => state.remove(path),
            };
        }
        let tree = build_tree(repo.odb(), &state)?;
        let message = match &group.message {
            Some(message) => normalize(message),
            None => format!("{summary} ({}/{total})\n", i + 1),
        };
        let mut piece = Commit::new(tree, parent.into_iter().collect(), committer.clone(), message);
        piece.author = target.author.clone();
        let oid = repo.odb().write(&Object::Commit(piece))?;
        created.push(oid);
        parent = Some(oid);
    }

    let old_tip = chain[0].oid;
    let tip = reparent(repo, *created.last().unwrap_or(commit), &chain[..pos])?;
    move_branch(repo, old_tip, tip, format!("split: {summary}"))?;
    info!(%commit, pieces = total, "split commit");
    Ok(created)
}

/// Squash a contiguous first-parent run into one commit with the oldest's
/// parents and author and the newest's tree.
pub fn combine(repo: &Repository, commits: &[ObjectId], message: &str) -> Result<ObjectId> {
    refuse_during_merge(repo)?;
    if message.trim().is_empty() {
        return Err(MergeError::InvalidRewrite("empty commit message".into()));
    }
    if commits.is_empty() {
        return Err(MergeError::InvalidRewrite("no commits to combine".into()));
    }

    let chain = first_parent_chain(repo)?;
    let mut positions = commits
        .iter()
        .map(|c| position(&chain, c))
        .collect::<Result<Vec<_>>>()?;
    positions.sort_unstable();
    if positions.windows(2).any(|w| w[1] != w[0] + 1) {
        return Err(MergeError::InvalidRewrite(
            "commits must be distinct and contiguous on the branch".into(),
        ));
    }
    let (newest, oldest) = (positions[0], positions[positions.len() - 1]);
    if let Some(merge) = chain[newest..=oldest].iter().find(|e| e.commit.is_merge()) {
        return Err(MergeError::InvalidRewrite(format!("{} is a merge commit", merge.oid)));
    }

    let first = &chain[oldest].commit;
    let mut combined = Commit::new(
        chain[newest].commit.tree,
        first.parents.clone(),
        repo.signature()?,
        normalize(message),
    );
    combined.author = first.author.clone();
    let oid = repo.odb().write(&Object::Commit(combined))?;

    let tip = reparent(repo, oid, &chain[..newest])?;
    move_branch(repo, chain[0].oid, tip, format!("combine: {} commits", positions.len()))?;
    info!(%oid, commits = positions.len(), "combined commits");
    Ok(oid)
}

/// Stage `files`, then rewrite `HEAD` with the index tree and, if given, a
/// new message. Parents and author stay; the committer is refreshed.
pub fn amend<P: AsRef<Path>>(repo: &Repository, files: &[P], message: Option<&str>) -> Result<ObjectId> {
    refuse_during_merge(repo)?;
    let (head, commit) = repo
        .head_commit()?
        .ok_or_else(|| MergeError::InvalidRewrite("nothing to amend on an unborn branch".into()))?;
    if message.is_some_and(|m| m.trim().is_empty()) {
        return Err(MergeError::InvalidRewrite("empty commit message".into()));
    }

    if !files.is_empty() {
        repo.add_all(files)?;
    }
    let tree = repo.index()?.write_tree(repo.odb())?;
    let amended = Commit {
        tree,
        committer: repo.signature()?,
        message: message.map_or_else(|| commit.message.clone(), |m| normalize(m).into()),
        gpgsig: None,
        ..commit
    };
    let summary = amended.summary().to_str_lossy().into_owned();
    let oid = repo.odb().write(&Object::Commit(amended))?;
    move_branch(repo, head, oid, format!("commit (amend): {summary}"))?;
    info!(%oid, "amended");
    Ok(oid)
}
