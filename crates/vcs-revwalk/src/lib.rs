//! Walking the commit graph.
//!
//! Commits are looked up by id in the object database as the walk needs
//! them; nothing holds pointers between commits. The graph is acyclic by
//! construction (a commit can only name parents that already exist), but
//! every walk still tracks what it has seen so that shared ancestry behind
//! merges is visited once.

mod merge_base;
mod range;
mod walk;

pub use merge_base::{is_ancestor, merge_base, merge_bases};
pub use range::resolve_revision;
pub use walk::{commits_between, log, LogEntry, LogOptions, RevWalk};

use vcs_hash::ObjectId;
use vcs_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error("invalid revision '{0}'")]
    InvalidRevision(String),

    #[error("unknown revision '{0}'")]
    UnknownRevision(String),

    #[error("{0} has no parent {1}")]
    NoSuchParent(ObjectId, usize),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vcs_ref::RefError),

    #[error(transparent)]
    Repo(#[from] vcs_repository::RepoError),
}

impl RevWalkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RevWalkError::InvalidRevision(_) => ErrorKind::Invalid,
            RevWalkError::UnknownRevision(_) | RevWalkError::NoSuchParent(..) => {
                ErrorKind::NotFound
            }
            RevWalkError::Odb(e) => e.kind(),
            RevWalkError::Ref(e) => e.kind(),
            RevWalkError::Repo(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RevWalkError>;
