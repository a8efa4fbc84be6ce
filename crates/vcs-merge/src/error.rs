use bstr::BString;
use vcs_hash::ObjectId;
use vcs_utils::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("cannot merge into an unborn branch")]
    UnbornHead,

    #[error("refusing to merge unrelated histories")]
    UnrelatedHistories,

    #[error("a merge is already in progress; commit or abort it first")]
    MergeInProgress,

    #[error("no merge in progress")]
    NoMergeInProgress,

    #[error("a rebase is in progress")]
    RebaseInProgress,

    #[error("no rebase in progress")]
    NoRebaseInProgress,

    #[error("local changes would be overwritten: {}", join(.0))]
    LocalChanges(Vec<BString>),

    #[error("unresolved paths: {}", join(.0))]
    Unresolved(Vec<BString>),

    #[error("invalid rebase: {0}")]
    InvalidRebase(String),

    #[error("cannot rewrite history: {0}")]
    InvalidRewrite(String),

    #[error("{0} is not on the current branch's first-parent history")]
    NotOnBranch(ObjectId),

    #[error("rebase state is unreadable: {0}")]
    State(#[from] serde_json::Error),

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
    Config(#[from] vcs_config::ConfigError),

    #[error(transparent)]
    Util(#[from] vcs_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join(paths: &[BString]) -> String {
    paths.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::UnbornHead
            | MergeError::UnrelatedHistories
            | MergeError::MergeInProgress
            | MergeError::NoMergeInProgress
            | MergeError::RebaseInProgress
            | MergeError::NoRebaseInProgress
            | MergeError::InvalidRebase(_)
            | MergeError::InvalidRewrite(_)
            | MergeError::NotOnBranch(_) => ErrorKind::Invalid,
            MergeError::LocalChanges(_) | MergeError::Unresolved(_) => ErrorKind::Conflict,
            MergeError::State(_) => ErrorKind::Corrupt,
            MergeError::Diff(e) => e.kind(),
            MergeError::RevWalk(e) => e.kind(),
            MergeError::Repo(e) => e.kind(),
            MergeError::Odb(e) => e.kind(),
            MergeError::Index(e) => e.kind(),
            MergeError::Ref(e) => e.kind(),
            MergeError::Config(e) => e.kind(),
            MergeError::Util(e) => e.kind(),
            MergeError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}
