//! References: named, mutable pointers into the commit graph.
//!
//! Each ref is one small file under the repository directory
//! (`refs/heads/main`, `HEAD`, ...) holding either a hex object id or
//! `ref: <other ref>`. All writes go through [`RefTransaction`], which locks
//! every touched ref, checks the expected old values, and only then renames
//! the new contents into place.

mod error;
mod name;
pub mod reflog;
mod store;
mod transaction;

pub use error::RefError;
pub use name::RefName;
pub use reflog::ReflogEntry;
pub use store::{RefStore, MAX_SYMREF_DEPTH};
pub use transaction::{RefTransaction, RefUpdate, RefUpdateAction};

use vcs_hash::ObjectId;

pub type Result<T> = std::result::Result<T, RefError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct { name: RefName, target: ObjectId },
    Symbolic { name: RefName, target: RefName },
}

impl Reference {
    pub fn name(&self) -> &RefName {
        match self {
            Reference::Direct { name, .. } | Reference::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic { .. })
    }

    pub fn target_oid(&self) -> Option<ObjectId> {
        match self {
            Reference::Direct { target, .. } => Some(*target),
            Reference::Symbolic { .. } => None,
        }
    }

    pub fn symbolic_target(&self) -> Option<&RefName> {
        match self {
            Reference::Symbolic { target, .. } => Some(target),
            Reference::Direct { .. } => None,
        }
    }
}
