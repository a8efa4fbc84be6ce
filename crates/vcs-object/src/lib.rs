//! The object model: blobs, trees, commits and tags.
//!
//! Objects are immutable values. Their identity is the digest of
//! [`Object::serialize`], which is canonical: two logically equal objects
//! always serialize to the same bytes (trees sort their entries, commits and
//! tags emit headers in a fixed order).

mod blob;
mod commit;
mod fields;
pub mod header;
mod tag;
mod tree;

pub use blob::{is_binary, Blob};
pub use commit::Commit;
pub use tag::Tag;
pub use tree::{FileMode, Tree, TreeEntry};

use std::fmt;
use std::str::FromStr;

use bstr::BString;
use vcs_hash::{HashAlgorithm, HashError, Hasher, ObjectId};
use vcs_utils::ErrorKind;

/// Errors produced while parsing or validating objects.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("object has {extra} bytes beyond its declared size")]
    TrailingData { extra: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("duplicate tree entry '{0}'")]
    DuplicateEntry(BString),

    #[error("invalid {object}: missing '{field}' header")]
    MissingField {
        object: &'static str,
        field: &'static str,
    },

    #[error("invalid file mode: {0}")]
    InvalidFileMode(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

impl ObjectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ObjectError::Hash(e) => e.kind(),
            _ => ErrorKind::Invalid,
        }
    }
}

/// The four kinds of stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    pub const fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = ObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// A parsed object of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    /// Parse the canonical form (header + payload). The payload must be
    /// exactly as long as the header declares.
    pub fn parse(raw: &[u8], algo: HashAlgorithm) -> Result<Self, ObjectError> {
        let (kind, size, header_len) = header::parse(raw)?;
        let payload = &raw[header_len..];
        if payload.len() < size {
            return Err(ObjectError::Truncated {
                expected: size,
                actual: payload.len(),
            });
        }
        if payload.len() > size {
            return Err(ObjectError::TrailingData {
                extra: payload.len() - size,
            });
        }
        Self::parse_content(kind, payload, algo)
    }

    /// Parse a payload whose kind is already known.
    pub fn parse_content(
        kind: ObjectType,
        payload: &[u8],
        algo: HashAlgorithm,
    ) -> Result<Self, ObjectError> {
        Ok(match kind {
            ObjectType::Blob => Self::Blob(Blob::new(payload.to_vec())),
            ObjectType::Tree => Self::Tree(Tree::parse(payload, algo)?),
            ObjectType::Commit => Self::Commit(Commit::parse(payload)?),
            ObjectType::Tag => Self::Tag(Tag::parse(payload)?),
        })
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
            Self::Tag(_) => ObjectType::Tag,
        }
    }

    /// The payload without header.
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone(),
            Self::Tree(t) => t.serialize_content(),
            Self::Commit(c) => c.serialize_content(),
            Self::Tag(t) => t.serialize_content(),
        }
    }

    /// `"<type> <size>\0" + payload`, the form that is hashed and stored.
    pub fn serialize(&self) -> Vec<u8> {
        let payload = self.serialize_content();
        let mut out = header::encode(self.object_type(), payload.len());
        out.extend_from_slice(&payload);
        out
    }

    pub fn compute_oid(&self, algo: HashAlgorithm) -> Result<ObjectId, HashError> {
        Hasher::hash_object(algo, self.object_type().as_str(), &self.serialize_content())
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Self::Tag(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_blob(self) -> Option<Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_tree(self) -> Option<Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_commit(self) -> Option<Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_tag(self) -> Option<Tag> {
        match self {
            Self::Tag(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Blob> for Object {
    fn from(b: Blob) -> Self {
        Self::Blob(b)
    }
}

impl From<Tree> for Object {
    fn from(t: Tree) -> Self {
        Self::Tree(t)
    }
}

impl From<Commit> for Object {
    fn from(c: Commit) -> Self {
        Self::Commit(c)
    }
}

impl From<Tag> for Object {
    fn from(t: Tag) -> Self {
        Self::Tag(t)
    }
}
