//! Merge engine.
//!
//! [`merge_content`] is a diff3 merge of three versions of one file.
//! [`merge_trees`] lifts it to whole snapshots, following renames on
//! either side and classifying what cannot be combined. On top of those sit
//! the repository operations: [`merge`], the persisted [`Rebase`] state
//! machine, and the history rewrites [`split`], [`combine`] and [`amend`].
//!
//! Conflicts are results, not errors. A conflicted merge or rebase step
//! leaves markers in the work tree and stages 1-3 in the index, and waits
//! for the caller to resolve, continue or abort.

pub mod cherry_pick;
mod conflict;
pub mod content;
mod error;
pub mod merge;
pub mod rebase;
pub mod rewrite;
pub mod tree;

pub use cherry_pick::cherry_pick_tree;
pub use content::{merge_content, ContentMerge, MergeLabels};
pub use error::MergeError;
pub use merge::{merge, merge_abort, MergeOutcome};
pub use rebase::{rebase_in_progress, Rebase, RebaseAction, RebaseProgress, RebaseState, RebaseStatus, RebaseStep};
pub use rewrite::{amend, combine, split, SplitGroup};
pub use tree::{merge_trees, TreeMergeResult};

use bstr::BString;
use vcs_config::Config;
use vcs_hash::ObjectId;
use vcs_index::TreeItem;
use vcs_object::FileMode;

pub type Result<T> = std::result::Result<T, MergeError>;

/// Conflict marker layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStyle {
    /// Ours and theirs only.
    #[default]
    Merge,
    /// Ours, base and theirs.
    Diff3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Similarity (0-100) needed to follow a rename.
    pub rename_threshold: u8,
    pub conflict_style: ConflictStyle,
    /// Treat overlapping edits that differ only in whitespace as identical.
    pub ignore_whitespace: bool,
    /// Always create a merge commit, even when a fast-forward is possible.
    pub no_ff: bool,
    /// Merge histories that share no commit, using an empty base.
    pub allow_unrelated: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            rename_threshold: 50,
            conflict_style: ConflictStyle::Merge,
            ignore_whitespace: false,
            no_ff: false,
            allow_unrelated: false,
        }
    }
}

impl MergeOptions {
    /// Defaults overridden by `merge.renameThreshold`,
    /// `merge.conflictStyle` and `merge.ignoreWhitespace`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let conflict_style = match config.choice("merge.conflictStyle", &["merge", "diff3"], "merge")? {
            "diff3" => ConflictStyle::Diff3,
            _ => ConflictStyle::Merge,
        };
        Ok(Self {
            rename_threshold: config.int_in("merge.renameThreshold", 0..=100, 50)? as u8,
            conflict_style,
            ignore_whitespace: config.bool_or("merge.ignoreWhitespace", false)?,
            ..Self::default()
        })
    }
}

/// Why a path could not be merged automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Both sides changed the same lines.
    Content,
    /// One side changed the file, the other deleted it.
    ModifyDelete,
    /// Both sides created the path with different content.
    AddAdd,
    /// Both sides renamed the same file to different paths.
    RenameRename,
    /// One side renamed the file, the other deleted it.
    RenameDelete,
    /// One side has a file where the other has a directory.
    DirectoryFile,
}

/// One version of a conflicted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSide {
    pub path: BString,
    pub oid: ObjectId,
    pub mode: FileMode,
}

impl ConflictSide {
    pub(crate) fn new(path: &BString, item: TreeItem) -> Self {
        Self {
            path: path.clone(),
            oid: item.oid,
            mode: item.mode,
        }
    }

    pub fn item(&self) -> TreeItem {
        TreeItem {
            oid: self.oid,
            mode: self.mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub path: BString,
    pub kind: ConflictKind,
    pub base: Option<ConflictSide>,
    pub ours: Option<ConflictSide>,
    pub theirs: Option<ConflictSide>,
    /// Blob holding the file with conflict markers, for content conflicts.
    pub merged: Option<TreeItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_config() {
        let config = Config::parse(
            "[merge]\n\trenameThreshold = 70\n\tconflictStyle = diff3\n\tignoreWhitespace = true\n",
        )
        .unwrap();
        let opts = MergeOptions::from_config(&config).unwrap();
        assert_eq!(opts.rename_threshold, 70);
        assert_eq!(opts.conflict_style, ConflictStyle::Diff3);
        assert!(opts.ignore_whitespace);
        assert!(!opts.no_ff);

        assert_eq!(MergeOptions::from_config(&Config::new()).unwrap(), MergeOptions::default());
    }

    #[test]
    fn bad_style_is_rejected() {
        let config = Config::parse("[merge]\n\tconflictStyle = zealous\n").unwrap();
        assert!(MergeOptions::from_config(&config).is_err());
    }
}
