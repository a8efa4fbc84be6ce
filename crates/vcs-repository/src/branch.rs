//! Branches and tags.

use tracing::info;
use vcs_hash::ObjectId;
use vcs_object::{Object, Tag};
use vcs_ref::{RefName, RefTransaction, Reference};
use vcs_utils::Signature;

use crate::{RepoError, Repository, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Short name, e.g. `main`.
    pub name: String,
    pub target: ObjectId,
    pub is_current: bool,
}

impl Repository {
    /// Create `refs/heads/<name>` at `at`, or at `HEAD` when `at` is `None`.
    pub fn create_branch(&self, name: &str, at: Option<ObjectId>) -> Result<ObjectId> {
        let refname = RefName::branch(name)?;
        if self.refs.exists(&refname)? {
            return Err(RepoError::BranchExists(name.to_owned()));
        }
        let start = match at {
            Some(oid) => oid,
            None => self.head_oid()?.ok_or(RepoError::UnbornHead)?,
        };
        let (target, _) = self.odb.peel_to_commit(&start)?;

        let mut tx = RefTransaction::new();
        tx.create(refname, target, format!("branch: created from {}", target.to_short_hex(7)));
        self.update_refs(tx, None)?;
        info!(branch = name, %target, "created branch");
        Ok(target)
    }

    /// Delete a branch other than the checked-out one.
    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let refname = RefName::branch(name)?;
        let target = self
            .refs
            .resolve(&refname)?
            .ok_or_else(|| RepoError::BranchNotFound(name.to_owned()))?;
        if self.current_branch()?.as_ref() == Some(&refname) {
            return Err(RepoError::BranchCheckedOut(name.to_owned()));
        }
        let mut tx = RefTransaction::new();
        tx.delete(refname, Some(target), "branch: deleted");
        self.update_refs(tx, None)?;
        info!(branch = name, %target, "deleted branch");
        Ok(())
    }

    /// All local branches, sorted by name.
    pub fn branches(&self) -> Result<Vec<Branch>> {
        let current = self.current_branch()?;
        let mut out = Vec::new();
        for reference in self.refs.list("refs/heads/")? {
            let name = reference.name().clone();
            let Some(target) = self.refs.resolve(&name)? else {
                continue;
            };
            out.push(Branch {
                name: name.short_name().to_owned(),
                target,
                is_current: current.as_ref() == Some(&name),
            });
        }
        Ok(out)
    }

    /// Create `refs/tags/<name>`. With a message and tagger an annotated tag
    /// object is written and the ref points at it; otherwise the tag is
    /// lightweight.
    pub fn create_tag(
        &self,
        name: &str,
        target: ObjectId,
        annotation: Option<(&str, &Signature)>,
    ) -> Result<ObjectId> {
        let refname = RefName::tag(name)?;
        if self.refs.exists(&refname)? {
            return Err(RepoError::TagExists(name.to_owned()));
        }
        let info = self.odb.read_header(&target)?;
        let points_at = match annotation {
            None => target,
            Some((message, tagger)) => self.odb.write(&Object::Tag(Tag {
                target,
                target_type: info.kind,
                name: name.into(),
                tagger: Some(tagger.clone()),
                message: crate::commit::normalize_message(message).into(),
            }))?,
        };

        let mut tx = RefTransaction::new();
        tx.create(refname, points_at, "tag: created");
        self.update_refs(tx, annotation.map(|(_, who)| who))?;
        info!(tag = name, %target, annotated = annotation.is_some(), "created tag");
        Ok(points_at)
    }

    /// Tag names with the object each ref holds (the tag object for
    /// annotated tags).
    pub fn tags(&self) -> Result<Vec<(String, ObjectId)>> {
        Ok(self
            .refs
            .list("refs/tags/")?
            .into_iter()
            .filter_map(|r| match r {
                Reference::Direct { name, target } => Some((name.short_name().to_owned(), target)),
                Reference::Symbolic { .. } => None,
            })
            .collect())
    }
}
