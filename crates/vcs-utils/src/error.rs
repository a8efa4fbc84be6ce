use std::fmt;
use std::path::PathBuf;

/// Coarse classification shared by every error type in the engine.
///
/// Each crate keeps its own error enum; `kind()` maps it onto one of
/// these so callers can react without matching on layer-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A missing object, ref, or working-directory path.
    NotFound,
    /// A duplicate name, e.g. creating a branch that exists.
    AlreadyExists,
    /// Malformed input or an operation that is not valid in the current state.
    Invalid,
    /// Filesystem failure.
    Io,
    /// Stored bytes failed verification or decompression.
    Corrupt,
    /// Refused because of unresolved or overlapping changes.
    Conflict,
    /// An allocation sized from stored data could not be satisfied.
    OutOfMemory,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Io => "i/o",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::Conflict => "conflict",
            ErrorKind::OutOfMemory => "out of memory",
        };
        f.write_str(s)
    }
}

/// Map an `io::Error` onto an [`ErrorKind`].
pub fn io_kind(err: &std::io::Error) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        std::io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
        _ => ErrorKind::Io,
    }
}

/// Base error type for vcs-utils operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("lock file error: {0}")]
    Lock(#[from] LockError),

    #[error("date parse error: {0}")]
    DateParse(String),

    #[error("invalid path '{path}': {reason}")]
    Path { path: String, reason: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl UtilError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UtilError::Lock(e) => e.kind(),
            UtilError::DateParse(_) | UtilError::Path { .. } => ErrorKind::Invalid,
            UtilError::Io(e) => io_kind(e),
        }
    }
}

/// Lock file specific errors.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("unable to create lock file '{path}': already locked")]
    AlreadyLocked { path: PathBuf },

    #[error("unable to create lock file '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to commit lock file '{path}': {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            // Another writer holds the lock: the caller lost a race.
            LockError::AlreadyLocked { .. } => ErrorKind::Conflict,
            LockError::Create { source, .. } | LockError::Commit { source, .. } => io_kind(source),
        }
    }
}
