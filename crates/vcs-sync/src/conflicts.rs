use bstr::{BString, ByteSlice};
use vcs_index::{Stage, TreeItem};
use vcs_merge::rebase_in_progress;
use vcs_repository::Repository;

use crate::Result;

/// The operation that left the repository with unmerged paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Merge,
    Rebase,
}

/// One unmerged path and the versions staged for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub path: BString,
    pub base: Option<TreeItem>,
    pub ours: Option<TreeItem>,
    pub theirs: Option<TreeItem>,
    pub operation: Option<Operation>,
}

impl ConflictReport {
    /// Which of stages 1-3 exist.
    pub fn stages(&self) -> Vec<Stage> {
        [
            (Stage::Base, &self.base),
            (Stage::Ours, &self.ours),
            (Stage::Theirs, &self.theirs),
        ]
        .into_iter()
        .filter(|(_, item)| item.is_some())
        .map(|(stage, _)| stage)
        .collect()
    }
}

/// Every unmerged index path, sorted by path.
pub fn report_conflicts(repo: &Repository) -> Result<Vec<ConflictReport>> {
    let operation = if rebase_in_progress(repo) {
        Some(Operation::Rebase)
    } else if repo.merge_head()?.is_some() {
        Some(Operation::Merge)
    } else {
        None
    };

    let index = repo.index()?;
    let reports = index
        .conflicted_paths()
        .into_iter()
        .map(|path| {
            let item = |stage| {
                index.get(path.as_bstr(), stage).map(|e| TreeItem {
                    oid: e.oid,
                    mode: e.mode,
                })
            };
            ConflictReport {
                base: item(Stage::Base),
                ours: item(Stage::Ours),
                theirs: item(Stage::Theirs),
                operation,
                path,
            }
        })
        .collect();
    Ok(reports)
}
