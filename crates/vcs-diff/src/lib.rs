//! Diff engine.
//!
//! Line diffs run Myers' O(ND) algorithm over interned line ids. Tree diffs
//! compare flattened snapshots, pair deletions with additions to find
//! renames, and attach hunks to every changed text file. The same hunks are
//! rendered as unified patches, parsed back, and replayed onto a directory.

pub mod algorithm;
pub mod apply;
mod error;
pub mod format;
pub mod patch;
pub mod rename;
pub mod tree;
pub mod worktree;

pub use algorithm::{diff_edits, diff_lines, Edit, EditOp};
pub use apply::{apply, apply_with, ApplyOptions, ContextPolicy};
pub use error::DiffError;
pub use format::{format_patch, format_stat, format_unified};
pub use patch::{parse_patch, FilePatch, Patch};
pub use rename::{find_renames, similarity, Rename};
pub use tree::{diff_blobs, diff_maps, diff_trees};
pub use worktree::{diff_head_to_index, diff_index_to_worktree, status, StatusEntry};

use bstr::{BStr, BString, ByteSlice};
use vcs_config::Config;
use vcs_hash::ObjectId;
use vcs_object::FileMode;

pub type Result<T> = std::result::Result<T, DiffError>;

/// Options controlling diff behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Unchanged lines shown around each change.
    pub context_lines: u32,
    pub detect_renames: bool,
    /// Minimum similarity (0-100) for a deletion and an addition to pair up.
    pub rename_threshold: u8,
    pub detect_copies: bool,
    /// Compare lines with all whitespace removed.
    pub ignore_whitespace: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            detect_renames: true,
            rename_threshold: 50,
            detect_copies: false,
            ignore_whitespace: false,
        }
    }
}

impl DiffOptions {
    /// Defaults overridden by `diff.context`, `diff.renames` and
    /// `diff.renameThreshold`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            context_lines: config.int_in("diff.context", 0..=i64::from(u32::MAX), 3)? as u32,
            detect_renames: config.bool_or("diff.renames", defaults.detect_renames)?,
            rename_threshold: config.int_in("diff.renameThreshold", 0..=100, 50)? as u8,
            ..defaults
        })
    }
}

/// File-level change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    /// Kind changed, e.g. a regular file replaced by a symlink.
    TypeChanged,
}

impl FileStatus {
    pub fn as_char(&self) -> char {
        match self {
            Self::Added => 'A',
            Self::Deleted => 'D',
            Self::Modified => 'M',
            Self::Renamed => 'R',
            Self::Copied => 'C',
            Self::TypeChanged => 'T',
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Diff for a single file.
///
/// Both paths are always set. They differ only for renames and copies;
/// an added file has no old side, a deleted one no new side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub status: FileStatus,
    pub old_path: BString,
    pub new_path: BString,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub old_oid: Option<ObjectId>,
    pub new_oid: Option<ObjectId>,
    /// Empty for binary files and mode-only changes.
    pub hunks: Vec<Hunk>,
    pub is_binary: bool,
    /// Similarity percentage for renames and copies.
    pub similarity: Option<u8>,
}

impl FileDiff {
    /// The path after the change (the old one for deletions).
    pub fn path(&self) -> &BStr {
        self.new_path.as_bstr()
    }

    pub fn insertions(&self) -> usize {
        self.lines()
            .filter(|l| matches!(l, DiffLine::Addition(_)))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.lines()
            .filter(|l| matches!(l, DiffLine::Deletion(_)))
            .count()
    }

    fn lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks.iter().flat_map(|h| &h.lines)
    }
}

/// A contiguous region of changes, numbered the unified-diff way: starts
/// are 1-based, and an empty range starts at the line before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub lines: Vec<DiffLine>,
}

/// One line of a hunk, including its terminating newline if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    Context(BString),
    Addition(BString),
    Deletion(BString),
}

impl DiffLine {
    pub fn content(&self) -> &BStr {
        match self {
            DiffLine::Context(l) | DiffLine::Addition(l) | DiffLine::Deletion(l) => l.as_bstr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = DiffOptions::default();
        assert_eq!(opts.context_lines, 3);
        assert!(opts.detect_renames);
        assert_eq!(opts.rename_threshold, 50);
        assert!(!opts.detect_copies);
    }

    #[test]
    fn options_from_config() {
        let config =
            Config::parse("[diff]\n\tcontext = 1\n\trenames = false\n\trenameThreshold = 80\n")
                .unwrap();
        let opts = DiffOptions::from_config(&config).unwrap();
        assert_eq!(opts.context_lines, 1);
        assert!(!opts.detect_renames);
        assert_eq!(opts.rename_threshold, 80);

        let bad = Config::parse("[diff]\n\trenameThreshold = 101\n").unwrap();
        assert!(DiffOptions::from_config(&bad).is_err());
    }

    #[test]
    fn file_status_char() {
        assert_eq!(FileStatus::Renamed.as_char(), 'R');
        assert_eq!(FileStatus::TypeChanged.to_string(), "T");
    }
}
