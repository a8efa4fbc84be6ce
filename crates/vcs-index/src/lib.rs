//! The staging area.
//!
//! The index is a flat, sorted list of paths with the blob each will have
//! in the next commit, plus cached stat data so unchanged files need not be
//! re-hashed. During a conflicted merge a path may carry stages 1 to 3
//! instead of a single stage 0 entry.

pub mod entry;
mod error;
mod file;
pub mod tree;

pub use entry::{mode_from_metadata, EntryStatus, IndexEntry, Stage, StatData};
pub use error::IndexError;
pub use tree::{build_tree, flatten_tree, TreeItem};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bstr::{BStr, BString, ByteSlice};
use tracing::debug;
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_object::FileMode;
use vcs_odb::ObjectDatabase;

pub type Result<T> = std::result::Result<T, IndexError>;

pub(crate) fn cmp_entries(a: &IndexEntry, b: &IndexEntry) -> Ordering {
    a.path.cmp(&b.path).then(a.stage.cmp(&b.stage))
}

#[derive(Debug, Clone)]
pub struct Index {
    /// Sorted by `(path, stage)`.
    entries: Vec<IndexEntry>,
    algo: HashAlgorithm,
    /// Modification time of the file this index was loaded from.
    timestamp: Option<(u32, u32)>,
}

impl Index {
    pub fn new(algo: HashAlgorithm) -> Self {
        Self {
            entries: Vec::new(),
            algo,
            timestamp: None,
        }
    }

    /// Load an index file. A missing file is an empty index.
    pub fn load(path: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self> {
        let path = path.as_ref();
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(algo)),
            Err(e) => return Err(e.into()),
        };
        let mut index = Self::parse(&data, algo)?;
        index.timestamp = std::fs::metadata(path)?.modified().ok().and_then(split_time);
        Ok(index)
    }

    pub fn parse(data: &[u8], algo: HashAlgorithm) -> Result<Self> {
        Ok(Self {
            entries: file::parse(data, algo)?,
            algo,
            timestamp: None,
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        file::serialize(&self.entries, self.algo)
    }

    /// Replace the file at `path` wholesale, under its lock.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = self.serialize()?;
        vcs_utils::lockfile::write_locked(path.as_ref(), &data)?;
        debug!(entries = self.entries.len(), "wrote index");
        Ok(())
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn get(&self, path: &BStr, stage: Stage) -> Option<&IndexEntry> {
        self.position(path, stage).ok().map(|i| &self.entries[i])
    }

    /// The stage 0 entry for `path`.
    pub fn entry(&self, path: &BStr) -> Option<&IndexEntry> {
        self.get(path, Stage::Normal)
    }

    /// All stages recorded for `path`, in stage order.
    pub fn stages(&self, path: &BStr) -> Vec<&IndexEntry> {
        self.entries.iter().filter(|e| e.path.as_bstr() == path).collect()
    }

    pub fn contains_path(&self, path: &BStr) -> bool {
        self.entries.iter().any(|e| e.path.as_bstr() == path)
    }

    fn position(&self, path: &BStr, stage: Stage) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.path.as_bstr().cmp(path).then(e.stage.cmp(&stage)))
    }

    /// Insert or replace an entry. A stage 0 entry resolves the path: any
    /// conflict stages for it are dropped.
    pub fn add(&mut self, entry: IndexEntry) {
        if entry.stage == Stage::Normal {
            self.entries
                .retain(|e| e.path != entry.path || e.stage == Stage::Normal);
        } else {
            self.entries
                .retain(|e| e.path != entry.path || e.stage != Stage::Normal);
        }
        match self.position(entry.path.as_bstr(), entry.stage) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    /// Drop every stage of `path`. Returns whether anything was removed.
    pub fn remove_path(&mut self, path: &BStr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.path.as_bstr() != path);
        self.entries.len() != before
    }

    /// Drop every entry under directory `dir`.
    pub fn remove_dir(&mut self, dir: &BStr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !is_under(e.path.as_bstr(), dir));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record an unresolved path. Absent sides get no stage.
    pub fn set_conflict(
        &mut self,
        path: &BStr,
        base: Option<TreeItem>,
        ours: Option<TreeItem>,
        theirs: Option<TreeItem>,
    ) {
        self.remove_path(path);
        for (stage, item) in [(Stage::Base, base), (Stage::Ours, ours), (Stage::Theirs, theirs)] {
            if let Some(item) = item {
                self.add(IndexEntry::new(path, item.oid, item.mode).with_stage(stage));
            }
        }
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != Stage::Normal)
    }

    /// Paths with conflict stages, each once.
    pub fn conflicted_paths(&self) -> Vec<BString> {
        let mut paths: Vec<BString> = self
            .entries
            .iter()
            .filter(|e| e.stage != Stage::Normal)
            .map(|e| e.path.clone())
            .collect();
        paths.dedup();
        paths
    }

    /// Whether the work-tree file behind `entry` can be assumed unchanged
    /// without hashing it.
    ///
    /// A file modified in the same instant the index was written could
    /// change again without its mtime moving, so such racy entries always
    /// report "maybe changed".
    pub fn stat_unchanged(&self, entry: &IndexEntry, meta: &Metadata) -> bool {
        if entry.stat.is_empty() || !entry.stat.matches(meta) {
            return false;
        }
        match self.timestamp {
            Some(index_time) => (entry.stat.mtime_secs, entry.stat.mtime_nsecs) < index_time,
            None => false,
        }
    }

    /// Stage 0 entries as a path map.
    pub fn to_tree_items(&self) -> BTreeMap<BString, TreeItem> {
        self.entries
            .iter()
            .filter(|e| e.stage == Stage::Normal)
            .map(|e| {
                (
                    e.path.clone(),
                    TreeItem {
                        oid: e.oid,
                        mode: e.mode,
                    },
                )
            })
            .collect()
    }

    /// Write the staged snapshot as tree objects. Refuses while any path
    /// is unmerged.
    pub fn write_tree(&self, odb: &ObjectDatabase) -> Result<ObjectId> {
        if self.has_conflicts() {
            return Err(IndexError::Unmerged(self.conflicted_paths()));
        }
        build_tree(odb, &self.to_tree_items())
    }

    /// Replace the contents with the tree `tree`. Stat data is left empty,
    /// so the next status check hashes every file once.
    pub fn read_tree(&mut self, odb: &ObjectDatabase, tree: &ObjectId) -> Result<()> {
        let items = flatten_tree(odb, tree)?;
        self.entries = items
            .into_iter()
            .map(|(path, item)| IndexEntry::new(path, item.oid, item.mode))
            .collect();
        Ok(())
    }

    /// Stage `path` with the given blob and stat data.
    pub fn stage_file(&mut self, path: &BStr, oid: ObjectId, mode: FileMode, stat: StatData) {
        self.add(IndexEntry::new(path, oid, mode).with_stat(stat));
    }
}

fn is_under(path: &BStr, dir: &BStr) -> bool {
    dir.is_empty()
        || (path.len() > dir.len() && path.starts_with(dir) && path[dir.len()] == b'/')
}

fn split_time(t: SystemTime) -> Option<(u32, u32)> {
    let d = t.duration_since(UNIX_EPOCH).ok()?;
    Some((d.as_secs() as u32, d.subsec_nanos()))
}
