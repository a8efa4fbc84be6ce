use vcs_utils::{ErrorKind, UtilError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("bad config line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("invalid config key '{0}'")]
    InvalidKey(String),

    #[error("bad boolean value '{value}' for {key}")]
    InvalidBool { key: String, value: String },

    #[error("bad numeric value '{value}' for {key}")]
    InvalidInt { key: String, value: String },

    #[error("bad value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Util(#[from] UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Util(e) => e.kind(),
            ConfigError::Io(e) => vcs_utils::error::io_kind(e),
            _ => ErrorKind::Invalid,
        }
    }
}
