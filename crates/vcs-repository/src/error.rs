use std::path::PathBuf;

use bstr::BString;
use vcs_utils::ErrorKind;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a repository (or any parent directory): {0}")]
    NotARepository(PathBuf),

    #[error("pathspec '{0}' did not match any file")]
    PathNotFound(BString),

    #[error("branch '{0}' not found")]
    BranchNotFound(String),

    #[error("branch '{0}' already exists")]
    BranchExists(String),

    #[error("tag '{0}' already exists")]
    TagExists(String),

    #[error("cannot delete branch '{0}': it is checked out")]
    BranchCheckedOut(String),

    #[error("empty commit message")]
    EmptyMessage,

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("HEAD does not point at a commit yet")]
    UnbornHead,

    #[error("no identity configured: set user.name and user.email")]
    NoIdentity,

    #[error("unmerged paths: {}", join(.0))]
    Unmerged(Vec<BString>),

    #[error("local changes would be overwritten: {}", join(.paths))]
    CheckoutConflict { paths: Vec<BString> },

    #[error(transparent)]
    Config(#[from] vcs_config::ConfigError),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vcs_ref::RefError),

    #[error(transparent)]
    Index(#[from] vcs_index::IndexError),

    #[error(transparent)]
    Object(#[from] vcs_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Util(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join(paths: &[BString]) -> String {
    paths.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::NotARepository(_)
            | RepoError::PathNotFound(_)
            | RepoError::BranchNotFound(_) => ErrorKind::NotFound,
            RepoError::BranchExists(_) | RepoError::TagExists(_) => ErrorKind::AlreadyExists,
            RepoError::BranchCheckedOut(_)
            | RepoError::EmptyMessage
            | RepoError::NothingToCommit
            | RepoError::UnbornHead
            | RepoError::NoIdentity => ErrorKind::Invalid,
            RepoError::Unmerged(_) | RepoError::CheckoutConflict { .. } => ErrorKind::Conflict,
            RepoError::Config(e) => e.kind(),
            RepoError::Odb(e) => e.kind(),
            RepoError::Ref(e) => e.kind(),
            RepoError::Index(e) => e.kind(),
            RepoError::Object(e) => e.kind(),
            RepoError::Hash(e) => e.kind(),
            RepoError::Util(e) => e.kind(),
            RepoError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}
