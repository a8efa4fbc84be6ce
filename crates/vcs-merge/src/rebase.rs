//! Replaying commits onto a new base.
//!
//! A rebase is a state machine persisted in `rebase-state.json` inside the
//! repository directory. The file's absence is [`RebaseState::Idle`]. Every
//! transition rewrites it under a lock before the caller sees a result, so
//! a crashed process can be continued, skipped past or aborted from
//! whatever state it left behind.
//!
//! The branch being rebased never moves until the run completes: steps
//! advance a detached `HEAD`, and the branch is switched over with a
//! compare-and-swap against its original tip at the very end.

use std::io;
use std::path::PathBuf;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vcs_diff::{status, DiffOptions};
use vcs_hash::ObjectId;
use vcs_index::EntryStatus;
use vcs_object::{Commit, Object};
use vcs_odb::OdbError;
use vcs_ref::{RefName, RefTransaction};
use vcs_repository::Repository;
use vcs_revwalk::{commits_between, resolve_revision};
use vcs_utils::lockfile::write_locked;

use crate::conflict::write_merge_result;
use crate::{cherry_pick_tree, ConflictEntry, MergeError, MergeLabels, MergeOptions, Result};

const STATE_FILE: &str = "rebase-state.json";

pub(crate) fn state_path(repo: &Repository) -> PathBuf {
    repo.repo_dir().join(STATE_FILE)
}

/// Whether a rebase has been started and not yet finished or aborted.
pub fn rebase_in_progress(repo: &Repository) -> bool {
    state_path(repo).exists()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebaseAction {
    Pick,
    /// Pick with a new message.
    Reword,
    /// Fold into the previous commit, joining both messages.
    Squash,
    /// Fold into the previous commit, keeping its message.
    Fixup,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseStep {
    pub action: RebaseAction,
    pub commit: ObjectId,
    /// Replacement message for `Reword` and `Squash`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RebaseStep {
    pub fn new(action: RebaseAction, commit: ObjectId) -> Self {
        Self {
            action,
            commit,
            message: None,
        }
    }

    pub fn pick(commit: ObjectId) -> Self {
        Self::new(RebaseAction::Pick, commit)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseProgress {
    /// Full name of the branch being rebased; `None` for a detached `HEAD`.
    pub head_name: Option<String>,
    pub orig_head: ObjectId,
    pub onto: ObjectId,
    /// Tip of the replayed history so far.
    pub current: ObjectId,
    pub steps: Vec<RebaseStep>,
    /// Index of the next step to run, or of the step that stopped.
    pub cursor: usize,
    /// Message for the commit that concludes a stopped step.
    pub pending_message: Option<String>,
    /// Original commits whose steps are finished.
    pub done: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "progress", rename_all = "lowercase")]
pub enum RebaseState {
    Idle,
    Running(RebaseProgress),
    Conflict(RebaseProgress),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseStatus {
    Completed { head: ObjectId },
    /// Step `step` conflicted; resolve, then continue, skip or abort.
    Stopped { step: usize, conflicts: Vec<ConflictEntry> },
    Aborted,
}

/// Driver for a rebase of the current branch. Holding the repository
/// mutably keeps other writers in this process out for its lifetime.
pub struct Rebase<'a> {
    repo: &'a mut Repository,
    opts: MergeOptions,
}

impl<'a> Rebase<'a> {
    /// Merge options come from the repository's `merge.*` settings.
    pub fn new(repo: &'a mut Repository) -> Result<Self> {
        let opts = MergeOptions::from_config(repo.config())?;
        Ok(Self { repo, opts })
    }

    pub fn with_options(mut self, opts: MergeOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn status(&self) -> Result<RebaseState> {
        match std::fs::read(state_path(self.repo)) {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(RebaseState::Idle),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &RebaseState) -> Result<()> {
        let path = state_path(self.repo);
        match state {
            RebaseState::Idle => match std::fs::remove_file(&path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
            _ => {
                write_locked(&path, &serde_json::to_vec_pretty(state)?)?;
                Ok(())
            }
        }
    }

    /// A pick for every non-merge commit between `upstream` and `HEAD`,
    /// oldest first.
    pub fn plan(&self, upstream: &str) -> Result<Vec<RebaseStep>> {
        let onto = resolve_revision(self.repo, upstream)?;
        let head = self.repo.head_oid()?.ok_or(MergeError::UnbornHead)?;
        Ok(commits_between(self.repo, onto, head)?
            .into_iter()
            .filter(|entry| !entry.commit.is_merge())
            .map(|entry| RebaseStep::pick(entry.oid))
            .collect())
    }

    /// Validate `steps`, record where the branch was, detach onto
    /// `upstream` and start replaying.
    pub fn start(&mut self, upstream: &str, steps: Vec<RebaseStep>) -> Result<RebaseStatus> {
        if !matches!(self.status()?, RebaseState::Idle) {
            return Err(MergeError::RebaseInProgress);
        }
        if self.repo.merge_head()?.is_some() {
            return Err(MergeError::MergeInProgress);
        }
        if steps.is_empty() {
            return Err(MergeError::InvalidRebase("nothing to do".into()));
        }
        let first = steps.iter().find(|s| s.action != RebaseAction::Drop);
        if first.is_some_and(|s| matches!(s.action, RebaseAction::Squash | RebaseAction::Fixup)) {
            return Err(MergeError::InvalidRebase(
                "cannot squash or fixup without a previous commit".into(),
            ));
        }
        for step in &steps {
            match self.repo.odb().read_commit(&step.commit) {
                Ok(_) => {}
                Err(OdbError::NotFound(_) | OdbError::WrongType { .. }) => {
                    return Err(MergeError::InvalidRebase(format!("{} is not a commit", step.commit)));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let (onto, _) = self.repo.odb().peel_to_commit(&resolve_revision(self.repo, upstream)?)?;
        let orig_head = self.repo.head_oid()?.ok_or(MergeError::UnbornHead)?;
        let dirty: Vec<_> = status(self.repo, &DiffOptions::default())?
            .into_iter()
            .filter(|e| e.staged.is_some() || e.unstaged.is_some_and(|s| s != EntryStatus::Untracked))
            .map(|e| e.path)
            .collect();
        if !dirty.is_empty() {
            return Err(MergeError::InvalidRebase(format!(
                "uncommitted changes in {}",
                dirty.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
            )));
        }

        let head_name = self.repo.current_branch()?.map(|b| b.as_str().to_owned());
        let progress = RebaseProgress {
            head_name,
            orig_head,
            onto,
            current: onto,
            steps,
            cursor: 0,
            pending_message: None,
            done: Vec::new(),
        };
        // Recorded before HEAD moves so an interrupted start can be aborted.
        self.save(&RebaseState::Running(progress.clone()))?;

        let mut tx = RefTransaction::new();
        tx.force(RefName::new("ORIG_HEAD")?, orig_head, "rebase: saving ORIG_HEAD");
        self.repo.update_refs(tx, None)?;
        self.repo.checkout_detached(onto)?;
        info!(%onto, steps = progress.steps.len(), "rebase started");
        self.run(progress)
    }

    /// Resume. From `Conflict` the resolved index concludes the stopped
    /// step; from `Running` (an interrupted process) the run just goes on.
    pub fn continue_rebase(&mut self) -> Result<RebaseStatus> {
        match self.status()? {
            RebaseState::Idle => Err(MergeError::NoRebaseInProgress),
            RebaseState::Running(progress) => self.run(progress),
            RebaseState::Conflict(mut progress) => {
                let index = self.repo.index()?;
                if index.has_conflicts() {
                    return Err(MergeError::Unresolved(index.conflicted_paths()));
                }
                let tree = index.write_tree(self.repo.odb())?;
                let step = current_step(&progress)?.clone();
                self.commit_step(&mut progress, &step, tree)?;
                progress.cursor += 1;
                self.save(&RebaseState::Running(progress.clone()))?;
                info!(step = progress.cursor - 1, "rebase continued");
                self.run(progress)
            }
        }
    }

    /// Drop the current step's changes and go on with the next one.
    pub fn skip(&mut self) -> Result<RebaseStatus> {
        let mut progress = match self.status()? {
            RebaseState::Idle => return Err(MergeError::NoRebaseInProgress),
            RebaseState::Running(p) | RebaseState::Conflict(p) => p,
        };
        let tree = self.repo.odb().read_commit(&progress.current)?.tree;
        self.repo.reset_hard(&tree)?;
        if let Some(step) = progress.steps.get(progress.cursor) {
            info!(commit = %step.commit, "skipping step");
            progress.done.push(step.commit);
            progress.cursor += 1;
        }
        progress.pending_message = None;
        self.save(&RebaseState::Running(progress.clone()))?;
        self.run(progress)
    }

    /// Put the branch, `HEAD`, index and work tree back the way they were
    /// before [`start`](Self::start).
    pub fn abort(&mut self) -> Result<RebaseStatus> {
        let progress = match self.status()? {
            RebaseState::Idle => return Err(MergeError::NoRebaseInProgress),
            RebaseState::Running(p) | RebaseState::Conflict(p) => p,
        };
        let tree = self.repo.odb().read_commit(&progress.orig_head)?.tree;
        self.repo.reset_hard(&tree)?;

        let mut tx = RefTransaction::new();
        match &progress.head_name {
            Some(name) => {
                let branch = RefName::new(name.clone())?;
                let message = format!("rebase (abort): returning to {}", branch.short_name());
                tx.update(branch.clone(), progress.orig_head, progress.orig_head, message.clone());
                tx.set_symbolic(RefName::head(), branch, message);
            }
            None => {
                tx.force(RefName::head(), progress.orig_head, "rebase (abort)");
            }
        }
        self.repo.update_refs(tx, None)?;
        self.save(&RebaseState::Idle)?;
        info!(orig_head = %progress.orig_head, "rebase aborted");
        Ok(RebaseStatus::Aborted)
    }

    fn run(&mut self, mut progress: RebaseProgress) -> Result<RebaseStatus> {
        while let Some(step) = progress.steps.get(progress.cursor).cloned() {
            if step.action == RebaseAction::Drop {
                debug!(commit = %step.commit, "dropping");
                progress.done.push(step.commit);
                progress.cursor += 1;
                self.save(&RebaseState::Running(progress.clone()))?;
                continue;
            }

            let odb = self.repo.odb();
            let onto_tree = odb.read_commit(&progress.current)?.tree;
            let short = step.commit.to_short_hex(7);
            let base_label = format!("parent of {short}");
            let labels = MergeLabels {
                base: &base_label,
                ours: "HEAD",
                theirs: &short,
            };
            let result = cherry_pick_tree(odb, &step.commit, &onto_tree, &self.opts, &labels)?;

            match result.tree {
                Some(tree) => {
                    self.commit_step(&mut progress, &step, tree)?;
                    progress.cursor += 1;
                    self.save(&RebaseState::Running(progress.clone()))?;
                }
                None => {
                    let ours = self.repo.commit_paths(&progress.current)?;
                    write_merge_result(self.repo, &ours, &result)?;
                    progress.pending_message = Some(self.step_message(&progress, &step)?);
                    self.save(&RebaseState::Conflict(progress.clone()))?;
                    warn!(
                        step = progress.cursor,
                        commit = %step.commit,
                        conflicts = result.conflicts.len(),
                        "rebase stopped on conflicts"
                    );
                    return Ok(RebaseStatus::Stopped {
                        step: progress.cursor,
                        conflicts: result.conflicts,
                    });
                }
            }
        }
        self.finish(progress)
    }

    /// The message the commit concluding `step` gets.
    fn step_message(&self, progress: &RebaseProgress, step: &RebaseStep) -> Result<String> {
        let odb = self.repo.odb();
        let picked = odb.read_commit(&step.commit)?;
        let picked_message = picked.message.to_str_lossy().into_owned();
        Ok(match step.action {
            RebaseAction::Pick | RebaseAction::Drop => picked_message,
            RebaseAction::Reword => step.message.clone().unwrap_or(picked_message),
            RebaseAction::Squash => match &step.message {
                Some(message) => message.clone(),
                None => {
                    let previous = odb.read_commit(&progress.current)?;
                    format!("{}\n\n{}", previous.message.to_str_lossy().trim_end(), picked_message)
                }
            },
            RebaseAction::Fixup => odb.read_commit(&progress.current)?.message.to_str_lossy().into_owned(),
        })
    }

    /// Record `tree` as the outcome of `step` and move the detached `HEAD`
    /// (and the work tree) to it. A pick that changes nothing is dropped.
    fn commit_step(&self, progress: &mut RebaseProgress, step: &RebaseStep, tree: ObjectId) -> Result<()> {
        let odb = self.repo.odb();
        let message = match progress.pending_message.take() {
            Some(message) => message,
            None => self.step_message(progress, step)?,
        };
        let message = format!("{}\n", message.trim_end());
        let current = odb.read_commit(&progress.current)?;
        let picked = odb.read_commit(&step.commit)?;

        let (parents, author) = match step.action {
            RebaseAction::Squash | RebaseAction::Fixup => (current.parents.clone(), current.author.clone()),
            _ if tree == current.tree => {
                info!(commit = %step.commit, "dropping pick that is already applied");
                progress.done.push(step.commit);
                return Ok(());
            }
            _ => (vec![progress.current], picked.author.clone()),
        };
        let mut commit = Commit::new(tree, parents, self.repo.signature()?, message);
        commit.author = author;
        let summary = commit.summary().to_str_lossy().into_owned();
        let oid = odb.write(&Object::Commit(commit))?;

        self.repo.reset_hard(&tree)?;
        let mut tx = RefTransaction::new();
        tx.force(RefName::head(), oid, format!("rebase: {summary}"));
        self.repo.update_refs(tx, None)?;

        debug!(from = %step.commit, to = %oid, "replayed");
        progress.current = oid;
        progress.done.push(step.commit);
        Ok(())
    }

    fn finish(&mut self, progress: RebaseProgress) -> Result<RebaseStatus> {
        let head = progress.current;
        let mut tx = RefTransaction::new();
        match &progress.head_name {
            Some(name) => {
                let branch = RefName::new(name.clone())?;
                let message = format!("rebase (finish): {} onto {}", branch.short_name(), progress.onto);
                tx.update(branch.clone(), progress.orig_head, head, message.clone());
                tx.set_symbolic(RefName::head(), branch, message);
            }
            None => {
                tx.force(RefName::head(), head, "rebase (finish)");
            }
        }
        self.repo.update_refs(tx, None)?;
        self.save(&RebaseState::Idle)?;
        info!(%head, steps = progress.steps.len(), "rebase completed");
        Ok(RebaseStatus::Completed { head })
    }
}

fn current_step(progress: &RebaseProgress) -> Result<&RebaseStep> {
    progress
        .steps
        .get(progress.cursor)
        .ok_or_else(|| MergeError::InvalidRebase("cursor is past the last step".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_with_tag() {
        let oid: ObjectId = "1111111111111111111111111111111111111111".parse().unwrap();
        let progress = RebaseProgress {
            head_name: Some("refs/heads/main".into()),
            orig_head: oid,
            onto: oid,
            current: oid,
            steps: vec![
                RebaseStep::pick(oid),
                RebaseStep::new(RebaseAction::Reword, oid).with_message("new"),
            ],
            cursor: 1,
            pending_message: None,
            done: vec![oid],
        };
        let state = RebaseState::Conflict(progress);
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"state\":\"conflict\""));
        assert!(json.contains("\"action\":\"reword\""));
        let back: RebaseState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);

        let idle = serde_json::to_string(&RebaseState::Idle).unwrap();
        assert_eq!(idle, "{\"state\":\"idle\"}");
    }
}
