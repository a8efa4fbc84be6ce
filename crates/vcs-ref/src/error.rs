use vcs_hash::{HashError, ObjectId};
use vcs_utils::{ErrorKind, UtilError};

#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("invalid ref name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("ref not found: {0}")]
    NotFound(String),

    #[error("ref already exists: {0}")]
    AlreadyExists(String),

    #[error("ref {name} moved: expected {expected}, found {}", describe(.actual))]
    CasFailed {
        name: String,
        expected: ObjectId,
        actual: Option<ObjectId>,
    },

    #[error("symbolic ref chain from {0} is too deep")]
    SymrefDepth(String),

    #[error("cannot create ref '{name}': '{conflict}' is in the way")]
    DirectoryConflict { name: String, conflict: String },

    #[error("malformed ref file {name}: {reason}")]
    Malformed { name: String, reason: String },

    #[error("duplicate update of {0} in one transaction")]
    DuplicateUpdate(String),

    #[error(transparent)]
    Util(#[from] UtilError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn describe(oid: &Option<ObjectId>) -> String {
    oid.map_or_else(|| "nothing".to_owned(), |o| o.to_string())
}

impl RefError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefError::NotFound(_) => ErrorKind::NotFound,
            RefError::AlreadyExists(_) | RefError::DirectoryConflict { .. } => {
                ErrorKind::AlreadyExists
            }
            RefError::CasFailed { .. } => ErrorKind::Conflict,
            RefError::InvalidName { .. }
            | RefError::SymrefDepth(_)
            | RefError::DuplicateUpdate(_) => ErrorKind::Invalid,
            RefError::Malformed { .. } => ErrorKind::Corrupt,
            RefError::Util(e) => e.kind(),
            RefError::Hash(e) => e.kind(),
            RefError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}
