use vcs_hash::{HashError, ObjectId};
use vcs_object::{ObjectError, ObjectType};
use vcs_utils::{ErrorKind, UtilError};

#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("{kind} references missing object {missing}")]
    MissingReference { kind: ObjectType, missing: ObjectId },

    #[error("object {oid} is a {actual}, expected a {expected}")]
    WrongType {
        oid: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("corrupt object {oid}: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error("cannot allocate {size} bytes for object {oid}")]
    OutOfMemory { oid: ObjectId, size: usize },

    #[error("no object matches '{0}'")]
    NoMatch(String),

    #[error("'{0}' is not an abbreviated object id")]
    InvalidPrefix(String),

    #[error("ambiguous object name '{prefix}': {count} candidates")]
    Ambiguous { prefix: String, count: usize },

    #[error("invalid object: {0}")]
    Invalid(#[from] ObjectError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Util(#[from] UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OdbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OdbError::NotFound(_)
            | OdbError::NoMatch(_)
            | OdbError::MissingReference { .. } => ErrorKind::NotFound,
            OdbError::WrongType { .. }
            | OdbError::InvalidPrefix(_)
            | OdbError::Ambiguous { .. } => ErrorKind::Invalid,
            OdbError::Corrupt { .. } => ErrorKind::Corrupt,
            OdbError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            OdbError::Invalid(e) => e.kind(),
            OdbError::Hash(e) => e.kind(),
            OdbError::Util(e) => e.kind(),
            OdbError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}
