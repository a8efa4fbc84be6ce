use std::fs::Metadata;

use bstr::BString;
use vcs_hash::ObjectId;
use vcs_object::FileMode;

/// Merge stage of an entry. Anything but `Normal` marks an unresolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Normal = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub fn from_bits(n: u16) -> Option<Self> {
        match n {
            0 => Some(Stage::Normal),
            1 => Some(Stage::Base),
            2 => Some(Stage::Ours),
            3 => Some(Stage::Theirs),
            _ => None,
        }
    }

    pub fn bits(self) -> u16 {
        self as u16
    }
}

/// How a path differs between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Untracked,
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
}

/// Cached filesystem metadata. Only the low 32 bits of each field are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            size: meta.len() as u32,
            ..Self::default()
        }
    }

    /// The `(mtime, size)` shortcut: equal means the content is assumed
    /// unchanged and is not re-hashed.
    pub fn matches(&self, meta: &Metadata) -> bool {
        let now = Self::from_metadata(meta);
        self.size == now.size
            && self.mtime_secs == now.mtime_secs
            && self.mtime_nsecs == now.mtime_nsecs
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Repository-relative, `/`-separated.
    pub path: BString,
    pub oid: ObjectId,
    pub mode: FileMode,
    pub stage: Stage,
    pub stat: StatData,
}

impl IndexEntry {
    pub fn new(path: impl Into<BString>, oid: ObjectId, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            oid,
            mode,
            stage: Stage::Normal,
            stat: StatData::default(),
        }
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_stat(mut self, stat: StatData) -> Self {
        self.stat = stat;
        self
    }
}

/// File mode to record for a work-tree file.
pub fn mode_from_metadata(meta: &Metadata) -> FileMode {
    if meta.file_type().is_symlink() {
        return FileMode::Symlink;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return FileMode::Executable;
        }
    }
    FileMode::Regular
}
