use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vcs_hash::ObjectId;
use vcs_utils::lockfile::LockFile;
use vcs_utils::Signature;

use crate::reflog::{self, ReflogEntry};
use crate::transaction::{RefTransaction, RefUpdateAction};
use crate::{RefError, RefName, Reference, Result};

/// Longest chain of symbolic refs followed before giving up.
pub const MAX_SYMREF_DEPTH: usize = 5;

/// Loose-file ref storage rooted at the repository directory.
pub struct RefStore {
    repo_dir: PathBuf,
    committer: Option<Signature>,
}

impl RefStore {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
            committer: None,
        }
    }

    /// Identity recorded in reflog entries. Without one, no reflog is kept.
    pub fn set_committer(&mut self, committer: Signature) {
        self.committer = Some(committer);
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn ref_path(&self, name: &RefName) -> PathBuf {
        self.repo_dir.join(name.as_str())
    }

    fn log_path(&self, name: &RefName) -> PathBuf {
        self.repo_dir.join("logs").join(name.as_str())
    }

    /// The ref as stored, without following symbolic targets.
    pub fn read(&self, name: &RefName) -> Result<Option<Reference>> {
        let path = self.ref_path(name);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(_) if path.is_dir() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let malformed = |reason: String| RefError::Malformed {
            name: name.to_string(),
            reason,
        };
        let text = std::str::from_utf8(&data).map_err(|_| malformed("not UTF-8".into()))?;
        let text = text.trim_end();
        if let Some(target) = text.strip_prefix("ref:") {
            let target = RefName::new(target.trim()).map_err(|e| malformed(e.to_string()))?;
            return Ok(Some(Reference::Symbolic {
                name: name.clone(),
                target,
            }));
        }
        let target = ObjectId::from_hex(text).map_err(|e| malformed(e.to_string()))?;
        Ok(Some(Reference::Direct {
            name: name.clone(),
            target,
        }))
    }

    pub fn exists(&self, name: &RefName) -> Result<bool> {
        Ok(self.read(name)?.is_some())
    }

    /// Follow symbolic refs to an object id. `None` if the chain ends at a
    /// ref that does not exist (an unborn branch).
    pub fn resolve(&self, name: &RefName) -> Result<Option<ObjectId>> {
        let mut current = name.clone();
        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.read(&current)? {
                None => return Ok(None),
                Some(Reference::Direct { target, .. }) => return Ok(Some(target)),
                Some(Reference::Symbolic { target, .. }) => current = target,
            }
        }
        Err(RefError::SymrefDepth(name.to_string()))
    }

    /// Like [`resolve`](Self::resolve) but a missing target is an error.
    pub fn peel(&self, name: &RefName) -> Result<ObjectId> {
        self.resolve(name)?.ok_or_else(|| RefError::NotFound(name.to_string()))
    }

    pub fn head(&self) -> Result<Option<Reference>> {
        self.read(&RefName::head())
    }

    /// The branch `HEAD` points at, or `None` when detached.
    pub fn current_branch(&self) -> Result<Option<RefName>> {
        Ok(self
            .head()?
            .and_then(|r| r.symbolic_target().cloned()))
    }

    pub fn head_oid(&self) -> Result<Option<ObjectId>> {
        self.resolve(&RefName::head())
    }

    /// All refs under `refs/` whose name starts with `prefix`, sorted by name.
    pub fn list(&self, prefix: &str) -> Result<Vec<Reference>> {
        let mut names = Vec::new();
        collect_names(&self.repo_dir.join("refs"), "refs", &mut names)?;
        names.sort();

        let mut out = Vec::new();
        for name in names.into_iter().filter(|n| n.starts_with(prefix)) {
            let Ok(name) = RefName::new(name) else { continue };
            if let Some(reference) = self.read(&name)? {
                out.push(reference);
            }
        }
        Ok(out)
    }

    /// Oldest entry first.
    pub fn reflog(&self, name: &RefName) -> Result<Vec<ReflogEntry>> {
        reflog::read(&self.log_path(name))
    }

    /// Value a compare-and-swap is checked against.
    fn current_value(&self, name: &RefName) -> Result<(bool, Option<ObjectId>)> {
        match self.read(name)? {
            None => Ok((false, None)),
            Some(Reference::Direct { target, .. }) => Ok((true, Some(target))),
            Some(Reference::Symbolic { target, .. }) => Ok((true, self.resolve(&target)?)),
        }
    }

    fn check_directory_conflict(&self, name: &RefName) -> Result<()> {
        let path = self.ref_path(name);
        if path.is_dir() {
            return Err(RefError::DirectoryConflict {
                name: name.to_string(),
                conflict: format!("{name}/"),
            });
        }
        let mut prefix = String::new();
        let components: Vec<&str> = name.as_str().split('/').collect();
        for component in &components[..components.len().saturating_sub(1)] {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);
            if self.repo_dir.join(&prefix).is_file() {
                return Err(RefError::DirectoryConflict {
                    name: name.to_string(),
                    conflict: prefix,
                });
            }
        }
        Ok(())
    }

    /// Apply every update or none of them.
    ///
    /// All locks are taken before any value is checked, and nothing is
    /// renamed into place until every check has passed. A failure at any
    /// point drops the locks and leaves every ref as it was.
    pub fn commit(&self, transaction: RefTransaction) -> Result<()> {
        let updates = transaction.updates;
        for (i, update) in updates.iter().enumerate() {
            if updates[..i].iter().any(|u| u.name == update.name) {
                return Err(RefError::DuplicateUpdate(update.name.to_string()));
            }
        }

        let mut locks = Vec::with_capacity(updates.len());
        let mut olds = Vec::with_capacity(updates.len());
        for update in &updates {
            if !matches!(update.action, RefUpdateAction::Delete { .. }) {
                self.check_directory_conflict(&update.name)?;
            }
            let lock = LockFile::acquire(self.ref_path(&update.name))?;
            let (exists, current) = self.current_value(&update.name)?;

            match &update.action {
                RefUpdateAction::Create { .. } if exists => {
                    return Err(RefError::AlreadyExists(update.name.to_string()));
                }
                RefUpdateAction::Update { expected, .. } if current != Some(*expected) => {
                    warn!(name = %update.name, %expected, "ref changed underneath update");
                    return Err(RefError::CasFailed {
                        name: update.name.to_string(),
                        expected: *expected,
                        actual: current,
                    });
                }
                RefUpdateAction::Delete { .. } if !exists => {
                    return Err(RefError::NotFound(update.name.to_string()));
                }
                RefUpdateAction::Delete {
                    expected: Some(expected),
                } if current != Some(*expected) => {
                    warn!(name = %update.name, %expected, "ref changed underneath delete");
                    return Err(RefError::CasFailed {
                        name: update.name.to_string(),
                        expected: *expected,
                        actual: current,
                    });
                }
                _ => {}
            }
            locks.push(lock);
            olds.push(current);
        }

        for (lock, update) in locks.iter_mut().zip(&updates) {
            match &update.action {
                RefUpdateAction::Create { new }
                | RefUpdateAction::Update { new, .. }
                | RefUpdateAction::Force { new } => writeln!(lock, "{}", new.to_hex())?,
                RefUpdateAction::SetSymbolic { target } => writeln!(lock, "ref: {target}")?,
                RefUpdateAction::Delete { .. } => {}
            }
        }

        let head_target = self.current_branch()?;
        for ((lock, update), old) in locks.into_iter().zip(&updates).zip(olds) {
            match &update.action {
                RefUpdateAction::Delete { .. } => {
                    remove_if_present(&self.ref_path(&update.name))?;
                    lock.rollback()?;
                    remove_if_present(&self.log_path(&update.name))?;
                    self.prune_empty_dirs(&update.name);
                    debug!(name = %update.name, "deleted ref");
                }
                RefUpdateAction::SetSymbolic { target } => {
                    lock.commit()?;
                    debug!(name = %update.name, %target, "set symbolic ref");
                }
                RefUpdateAction::Create { new }
                | RefUpdateAction::Update { new, .. }
                | RefUpdateAction::Force { new } => {
                    lock.commit()?;
                    debug!(name = %update.name, %new, "updated ref");
                    self.log_update(&update.name, old, *new, &update.message)?;
                    if head_target.as_ref() == Some(&update.name) {
                        self.log_update(&RefName::head(), old, *new, &update.message)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn log_update(&self, name: &RefName, old: Option<ObjectId>, new: ObjectId, message: &str) -> Result<()> {
        let Some(committer) = &self.committer else {
            return Ok(());
        };
        let entry = ReflogEntry {
            old: old.unwrap_or_else(|| new.algorithm().null_oid()),
            new,
            signature: committer.clone(),
            message: message.into(),
        };
        reflog::append(&self.log_path(name), &entry)
    }

    fn prune_empty_dirs(&self, name: &RefName) {
        let stop = self.repo_dir.join("refs");
        let mut dir = self.ref_path(name).parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == stop || !d.starts_with(&stop) || fs::remove_dir(&d).is_err() {
                break;
            }
            dir = d.parent().map(Path::to_path_buf);
        }
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn collect_names(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let name = format!("{prefix}/{file_name}");
        if entry.file_type()?.is_dir() {
            collect_names(&entry.path(), &name, out)?;
        } else if !file_name.ends_with(".lock") {
            out.push(name);
        }
    }
    Ok(())
}
