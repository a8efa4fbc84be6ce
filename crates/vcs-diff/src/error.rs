use bstr::BString;
use vcs_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("malformed patch at line {line}: {reason}")]
    MalformedPatch { line: usize, reason: String },

    #[error("patch does not apply to '{path}' (hunk {hunk})")]
    PatchConflict { path: BString, hunk: usize },

    #[error("patch target '{0}' does not exist")]
    MissingTarget(BString),

    #[error("patch creates '{0}' but it already exists")]
    TargetExists(BString),

    #[error("cannot apply binary patch to '{0}'")]
    BinaryPatch(BString),

    #[error("unsafe path in patch: '{0}'")]
    UnsafePath(BString),

    #[error(transparent)]
    Config(#[from] vcs_config::ConfigError),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Index(#[from] vcs_index::IndexError),

    #[error(transparent)]
    Repo(#[from] vcs_repository::RepoError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Util(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DiffError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DiffError::MalformedPatch { .. }
            | DiffError::BinaryPatch(_)
            | DiffError::UnsafePath(_) => ErrorKind::Invalid,
            DiffError::PatchConflict { .. } => ErrorKind::Conflict,
            DiffError::MissingTarget(_) => ErrorKind::NotFound,
            DiffError::TargetExists(_) => ErrorKind::AlreadyExists,
            DiffError::Config(e) => e.kind(),
            DiffError::Odb(e) => e.kind(),
            DiffError::Index(e) => e.kind(),
            DiffError::Repo(e) => e.kind(),
            DiffError::Hash(e) => e.kind(),
            DiffError::Util(e) => e.kind(),
            DiffError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}
