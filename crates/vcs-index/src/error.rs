use bstr::BString;
use vcs_hash::HashError;
use vcs_object::ObjectError;
use vcs_odb::OdbError;
use vcs_utils::{ErrorKind, UtilError};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("index has unmerged paths: {}", join(.0))]
    Unmerged(Vec<BString>),

    #[error("'{0}' is staged both as a file and as a directory")]
    PathConflict(BString),

    #[error(transparent)]
    Odb(#[from] OdbError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Util(#[from] UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Corrupt(_) => ErrorKind::Corrupt,
            IndexError::Unmerged(_) => ErrorKind::Conflict,
            IndexError::PathConflict(_) => ErrorKind::Invalid,
            IndexError::Odb(e) => e.kind(),
            IndexError::Object(e) => e.kind(),
            IndexError::Hash(e) => e.kind(),
            IndexError::Util(e) => e.kind(),
            IndexError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}

fn join(paths: &[BString]) -> String {
    paths.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
}
