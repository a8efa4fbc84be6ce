use std::cmp::Ordering;
use std::fmt;

use bstr::{BStr, BString, ByteSlice};
use vcs_hash::{HashAlgorithm, ObjectId};

use crate::ObjectError;

/// Mode of a tree entry, stored as ASCII octal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// 100644
    Regular,
    /// 100755
    Executable,
    /// 120000, the blob holds the link target.
    Symlink,
    /// 160000, a commit in another repository. Stored, never traversed.
    Gitlink,
    /// 40000
    Tree,
}

impl FileMode {
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let invalid = || ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into_owned());
        if s.is_empty() || !s.iter().all(|b| (b'0'..=b'7').contains(b)) {
            return Err(invalid());
        }
        let raw = s
            .iter()
            .try_fold(0u32, |acc, &b| acc.checked_mul(8)?.checked_add(u32::from(b - b'0')))
            .ok_or_else(invalid)?;
        Self::from_raw(raw).ok_or_else(invalid)
    }

    /// Map a numeric mode. Group-writable regular files (100664) are an old
    /// spelling of 100644 and are normalized to it.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0o100644 | 0o100664 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Gitlink),
            0o040000 => Some(Self::Tree),
            _ => None,
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o040000,
        }
    }

    /// Octal without leading zeros, as written in tree payloads.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Regular => b"100644",
            Self::Executable => b"100755",
            Self::Symlink => b"120000",
            Self::Gitlink => b"160000",
            Self::Tree => b"40000",
        }
    }

    pub fn is_tree(self) -> bool {
        self == Self::Tree
    }

    /// Regular or executable file.
    pub fn is_file(self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    /// Anything whose id names a blob.
    pub fn is_blob(self) -> bool {
        matches!(self, Self::Regular | Self::Executable | Self::Symlink)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o}", self.raw())
    }
}

/// One name in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: FileMode, name: impl Into<BString>, oid: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            oid,
        }
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonical order: bytewise by name, where a directory compares as if its
/// name ended in `/`. So `foo.c` < `foo/` < `foo0`.
impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_names(&self.name, self.mode.is_tree(), &other.name, other.mode.is_tree())
    }
}

pub(crate) fn compare_names(a: &[u8], a_dir: bool, b: &[u8], b_dir: bool) -> Ordering {
    let common = a.len().min(b.len());
    a[..common].cmp(&b[..common]).then_with(|| {
        let next = |name: &[u8], dir: bool| match name.get(common) {
            Some(&c) => c,
            None if dir => b'/',
            None => 0,
        };
        next(a, a_dir).cmp(&next(b, b_dir))
    })
}

fn check_name(name: &[u8]) -> Result<(), &'static str> {
    match name {
        b"" => Err("empty name"),
        b"." | b".." => Err("relative name"),
        n if n.contains(&b'/') => Err("name contains '/'"),
        _ => Ok(()),
    }
}

/// A directory listing.
///
/// The in-memory order of `entries` is irrelevant for identity:
/// [`serialize_content`](Tree::serialize_content) always writes canonical
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from entries in any order.
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Result<Self, ObjectError> {
        entries.sort();
        let tree = Self { entries };
        tree.validate()?;
        Ok(tree)
    }

    /// Each entry is `<octal mode> <name>\0<raw id>`.
    pub fn parse(content: &[u8], algo: HashAlgorithm) -> Result<Self, ObjectError> {
        let id_len = algo.digest_len();
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let bad = |offset: usize, reason: &str| ObjectError::InvalidTreeEntry {
                offset,
                reason: reason.to_owned(),
            };

            let space = content[pos..]
                .find_byte(b' ')
                .map(|p| pos + p)
                .ok_or_else(|| bad(pos, "missing space after mode"))?;
            let mode = FileMode::from_bytes(&content[pos..space])
                .map_err(|_| bad(pos, "invalid mode"))?;

            let name_start = space + 1;
            let nul = content[name_start..]
                .find_byte(0)
                .map(|p| name_start + p)
                .ok_or_else(|| bad(name_start, "missing NUL after name"))?;
            let name = &content[name_start..nul];
            check_name(name).map_err(|reason| bad(name_start, reason))?;

            let id_start = nul + 1;
            let id = content
                .get(id_start..id_start + id_len)
                .ok_or_else(|| bad(id_start, "truncated object id"))?;

            entries.push(TreeEntry {
                mode,
                name: BString::from(name),
                oid: ObjectId::from_bytes(id, algo)?,
            });
            pos = id_start + id_len;
        }

        Ok(Self { entries })
    }

    /// Reject names that could not be checked out and duplicate names.
    pub fn validate(&self) -> Result<(), ObjectError> {
        let mut names: Vec<&[u8]> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            check_name(&entry.name).map_err(|reason| ObjectError::InvalidTreeEntry {
                offset: 0,
                reason: format!("'{}': {reason}", entry.name),
            })?;
            names.push(&entry.name);
        }
        names.sort_unstable();
        if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(ObjectError::DuplicateEntry(BString::from(w[0])));
        }
        Ok(())
    }

    /// Payload in canonical entry order.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut order: Vec<&TreeEntry> = self.entries.iter().collect();
        order.sort();

        let id_len = order.first().map_or(0, |e| e.oid.as_bytes().len());
        let mut out = Vec::with_capacity(order.len() * (id_len + 16));
        for entry in order {
            out.extend_from_slice(entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn sort(&mut self) {
        self.entries.sort();
    }

    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
