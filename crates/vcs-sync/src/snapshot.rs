//! Whole-repository snapshots for backup.
//!
//! A snapshot stores the work tree as ordinary blobs and a tree, the index
//! file as one more blob, and records `HEAD` and every ref in a JSON
//! manifest under `.vcs/snapshots/`. Restoring writes all of it back, so
//! untracked files and staged-but-uncommitted changes survive a round trip.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use bstr::{BStr, ByteSlice};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vcs_hash::{Hasher, ObjectId};
use vcs_index::{build_tree, flatten_tree, TreeItem};
use vcs_ref::{RefName, RefTransaction, Reference};
use vcs_repository::{PathMap, Repository};
use vcs_utils::lockfile::write_locked;
use vcs_utils::Time;

use crate::{Result, SyncError};

const SNAPSHOT_DIR: &str = "snapshots";

/// Content-derived name of a snapshot: the same repository state always
/// gets the same id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SyncError::InvalidSnapshotId(id));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HeadState {
    /// `HEAD` names a branch, which may be unborn.
    Branch { name: String },
    Detached { commit: ObjectId },
}

/// The recorded state, without the bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct State {
    head: HeadState,
    refs: BTreeMap<String, ObjectId>,
    /// Blob holding the index file; `None` if there was none.
    index: Option<ObjectId>,
    work_tree: ObjectId,
}

/// A snapshot manifest as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// Seconds since the epoch.
    pub created: i64,
    pub head: HeadState,
    pub refs: BTreeMap<String, ObjectId>,
    pub index: Option<ObjectId>,
    pub work_tree: ObjectId,
}

fn snapshot_dir(repo: &Repository) -> PathBuf {
    repo.repo_dir().join(SNAPSHOT_DIR)
}

fn manifest_path(repo: &Repository, id: &SnapshotId) -> PathBuf {
    snapshot_dir(repo).join(format!("{id}.json"))
}

/// Record `HEAD`, every ref, the index and the whole work tree.
pub fn snapshot(repo: &Repository) -> Result<SnapshotId> {
    let head = match repo.refs().head()?.ok_or(SyncError::MissingHead)? {
        Reference::Symbolic { target, .. } => HeadState::Branch {
            name: target.as_str().to_owned(),
        },
        Reference::Direct { target, .. } => HeadState::Detached { commit: target },
    };

    let mut refs = BTreeMap::new();
    for reference in repo.refs().list("refs/")? {
        match reference.target_oid() {
            Some(oid) => {
                refs.insert(reference.name().as_str().to_owned(), oid);
            }
            None => debug!(name = %reference.name(), "skipping symbolic ref"),
        }
    }

    let index = match fs::read(repo.index_path()) {
        Ok(data) => Some(repo.odb().write_blob(&data)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let mut files = PathMap::new();
    for path in repo.scan_work_tree(BStr::new(""))? {
        if let Some(file) = repo.read_work_file(path.as_bstr())? {
            let oid = repo.odb().write_blob(&file.data)?;
            files.insert(path, TreeItem { oid, mode: file.mode });
        }
    }
    let work_tree = build_tree(repo.odb(), &files)?;

    let state = State {
        head,
        refs,
        index,
        work_tree,
    };
    let digest = Hasher::hash_object(repo.hash_algo(), "blob", &serde_json::to_vec(&state)?)?;
    let id = SnapshotId(digest.to_hex());
    let manifest = Snapshot {
        id: id.clone(),
        created: Time::now().seconds,
        head: state.head,
        refs: state.refs,
        index: state.index,
        work_tree: state.work_tree,
    };
    write_locked(manifest_path(repo, &id), &serde_json::to_vec_pretty(&manifest)?)?;
    info!(%id, files = files.len(), refs = manifest.refs.len(), "took snapshot");
    Ok(id)
}

fn load(repo: &Repository, id: &SnapshotId) -> Result<Snapshot> {
    match fs::read(manifest_path(repo, id)) {
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SyncError::SnapshotNotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Every stored snapshot, oldest first.
pub fn list_snapshots(repo: &Repository) -> Result<Vec<Snapshot>> {
    let entries = match fs::read_dir(snapshot_dir(repo)) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut out = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            out.push(serde_json::from_slice::<Snapshot>(&fs::read(&path)?)?);
        }
    }
    out.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    Ok(out)
}

/// Put the repository back into the state recorded by `id`. Running it
/// twice changes nothing the second time.
pub fn restore(repo: &Repository, id: &SnapshotId) -> Result<()> {
    let snap = load(repo, id)?;

    restore_work_tree(repo, &flatten_tree(repo.odb(), &snap.work_tree)?)?;

    match snap.index {
        Some(blob) => write_locked(repo.index_path(), &repo.odb().read_blob(&blob)?.data)?,
        None => match fs::remove_file(repo.index_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
    }

    restore_refs(repo, &snap)?;
    info!(%id, "restored snapshot");
    Ok(())
}

fn restore_work_tree(repo: &Repository, target: &PathMap) -> Result<()> {
    let present = repo.scan_work_tree(BStr::new(""))?;
    let mut removed = 0usize;
    for path in present.iter().filter(|p| !target.contains_key(*p)) {
        repo.remove_work_file(path.as_bstr())?;
        removed += 1;
    }
    let mut written = 0usize;
    for (path, item) in target {
        if repo.hash_work_file(path.as_bstr())?.as_ref() == Some(item) {
            continue;
        }
        repo.checkout_item(path.as_bstr(), item)?;
        written += 1;
    }
    debug!(written, removed, "restored work tree");
    Ok(())
}

fn restore_refs(repo: &Repository, snap: &Snapshot) -> Result<()> {
    let reason = format!("restore snapshot {}", snap.id);
    let current: BTreeMap<RefName, ObjectId> = repo
        .refs()
        .list("refs/")?
        .into_iter()
        .filter_map(|r| Some((r.name().clone(), r.target_oid()?)))
        .collect();

    let mut tx = RefTransaction::new();
    for (name, oid) in &current {
        if !snap.refs.contains_key(name.as_str()) {
            tx.delete(name.clone(), Some(*oid), reason.as_str());
        }
    }
    for (name, oid) in &snap.refs {
        let name = RefName::new(name.as_str())?;
        match current.get(&name) {
            Some(old) if old == oid => {}
            old => {
                tx.set(name, old.copied(), *oid, reason.as_str());
            }
        }
    }

    let head = repo.refs().head()?;
    match &snap.head {
        HeadState::Branch { name } => {
            let target = RefName::new(name.as_str())?;
            if head.as_ref().and_then(Reference::symbolic_target) != Some(&target) {
                tx.set_symbolic(RefName::head(), target, reason.as_str());
            }
        }
        HeadState::Detached { commit } => {
            if head.as_ref().and_then(Reference::target_oid) != Some(*commit) {
                tx.force(RefName::head(), *commit, reason.as_str());
            }
        }
    }

    if !tx.is_empty() {
        repo.update_refs(tx, None)?;
    }
    Ok(())
}
