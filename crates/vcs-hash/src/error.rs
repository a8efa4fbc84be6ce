use vcs_utils::ErrorKind;

/// Errors produced by hashing, hex parsing and (de)compression.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex character at position {position}: '{character}'")]
    InvalidHex { position: usize, character: char },

    #[error("invalid hex length: expected {expected}, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("unknown hash algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("SHA-1 collision attack detected")]
    Sha1Collision,

    #[error("corrupt compressed data: {reason}")]
    Decompress { reason: String },

    #[error("decompressed data exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("cannot allocate {size} bytes")]
    OutOfMemory { size: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HashError::InvalidHex { .. }
            | HashError::InvalidHexLength { .. }
            | HashError::InvalidDigestLength { .. }
            | HashError::UnknownAlgorithm(_) => ErrorKind::Invalid,
            HashError::Sha1Collision | HashError::Decompress { .. } | HashError::TooLarge { .. } => {
                ErrorKind::Corrupt
            }
            HashError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            HashError::Io(e) => vcs_utils::error::io_kind(e),
        }
    }
}
