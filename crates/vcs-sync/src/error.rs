use vcs_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("the current branch has no commits")]
    UnbornHead,

    #[error("HEAD is missing")]
    MissingHead,

    #[error("{0} shares no history with HEAD")]
    UnrelatedHistories(String),

    #[error("snapshot '{0}' not found")]
    SnapshotNotFound(String),

    #[error("invalid snapshot id '{0}'")]
    InvalidSnapshotId(String),

    #[error("snapshot manifest is unreadable: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error(transparent)]
    Merge(#[from] vcs_merge::MergeError),

    #[error(transparent)]
    Diff(#[from] vcs_diff::DiffError),

    #[error(transparent)]
    RevWalk(#[from] vcs_revwalk::RevWalkError),

    #[error(transparent)]
    Repo(#[from] vcs_repository::RepoError),

    #[error(transparent)]
    Odb(#[from] vcs_odb::OdbError),

    #[error(transparent)]
    Index(#[from] vcs_index::IndexError),

    #[error(transparent)]
    Ref(#[from] vcs_ref::RefError),

    #[error(transparent)]
    Hash(#[from] vcs_hash::HashError),

    #[error(transparent)]
    Util(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::UnbornHead | SyncError::UnrelatedHistories(_) | SyncError::InvalidSnapshotId(_) => {
                ErrorKind::Invalid
            }
            SyncError::SnapshotNotFound(_) => ErrorKind::NotFound,
            SyncError::MissingHead | SyncError::Manifest(_) => ErrorKind::Corrupt,
            SyncError::Merge(e) => e.kind(),
            SyncError::Diff(e) => e.kind(),
            SyncError::RevWalk(e) => e.kind(),
            SyncError::Repo(e) => e.kind(),
            SyncError::Odb(e) => e.kind(),
            SyncError::Index(e) => e.kind(),
            SyncError::Ref(e) => e.kind(),
            SyncError::Hash(e) => e.kind(),
            SyncError::Util(e) => e.kind(),
            SyncError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}
