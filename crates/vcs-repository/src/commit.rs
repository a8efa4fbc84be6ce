use bstr::ByteSlice;
use tracing::info;
use vcs_hash::ObjectId;
use vcs_object::{Commit, Object};
use vcs_ref::{RefName, RefTransaction};
use vcs_utils::Signature;

use crate::{RepoError, Repository, Result};

#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    /// Record a commit even if its tree equals the parent's.
    pub allow_empty: bool,
    /// Author when it differs from the committer.
    pub author: Option<Signature>,
}

/// Trailing newline, as commit messages are conventionally stored.
pub(crate) fn normalize_message(message: &str) -> String {
    let trimmed = message.trim_end();
    format!("{trimmed}\n")
}

impl Repository {
    /// Commit the index on top of `HEAD` and advance the current branch.
    pub fn commit(&self, message: &str, signature: &Signature) -> Result<ObjectId> {
        self.commit_with(message, signature, &CommitOptions::default())
    }

    pub fn commit_with(
        &self,
        message: &str,
        signature: &Signature,
        opts: &CommitOptions,
    ) -> Result<ObjectId> {
        if message.trim().is_empty() {
            return Err(RepoError::EmptyMessage);
        }
        let index = self.index()?;
        if index.has_conflicts() {
            return Err(RepoError::Unmerged(index.conflicted_paths()));
        }

        let head = self.head_commit()?;
        let merge_head = self.merge_head()?;
        let tree = index.write_tree(&self.odb)?;

        if !opts.allow_empty && merge_head.is_none() {
            let unchanged = match &head {
                Some((_, parent)) => parent.tree == tree,
                None => self.odb.read_tree(&tree)?.is_empty(),
            };
            if unchanged {
                return Err(RepoError::NothingToCommit);
            }
        }

        let head_oid = head.as_ref().map(|(oid, _)| *oid);
        let parents: Vec<ObjectId> = head_oid.into_iter().chain(merge_head).collect();
        let mut commit = Commit::new(tree, parents, signature.clone(), normalize_message(message));
        if let Some(author) = &opts.author {
            commit.author = author.clone();
        }
        let kind = match (head_oid, merge_head) {
            (None, _) => "commit (initial)",
            (_, Some(_)) => "commit (merge)",
            _ => "commit",
        };
        let reflog_message = format!("{kind}: {}", commit.summary().to_str_lossy());
        let oid = self.odb.write(&Object::Commit(commit))?;

        let mut tx = RefTransaction::new();
        let target = self.current_branch()?.unwrap_or_else(RefName::head);
        tx.set(target.clone(), head_oid, oid, reflog_message);
        if merge_head.is_some() {
            tx.delete(RefName::new("MERGE_HEAD")?, None, "merge concluded");
        }
        self.update_refs(tx, Some(signature))?;
        if merge_head.is_some() {
            self.clear_merge_state()?;
        }

        info!(%oid, branch = %target, "committed");
        Ok(oid)
    }
}
