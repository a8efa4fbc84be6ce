//! Shared primitives used by every layer of the vcs engine.

pub mod date;
pub mod error;
pub mod lockfile;
pub mod path;
pub mod tempfile;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use date::{Signature, Time};
pub use error::{ErrorKind, LockError, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;
