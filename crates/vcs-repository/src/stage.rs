//! `add` and `remove`.

use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use tracing::debug;
use vcs_index::Index;
use vcs_utils::path::{dirname, from_os_path};

use crate::{RepoError, Repository, Result};

fn is_under(path: &BStr, dir: &BStr) -> bool {
    dir.is_empty() || (path.len() > dir.len() && path.starts_with(dir) && path[dir.len()] == b'/')
}

impl Repository {
    /// Stage `path` (absolute, or relative to the work tree).
    ///
    /// A directory stages every file beneath it, including deletions of
    /// tracked files that are gone. A missing path that is tracked stages
    /// its deletion.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<()> {
        let rel = from_os_path(&self.work_tree, path.as_ref())?;
        let mut index = self.index()?;
        self.add_to(&mut index, rel.as_bstr())?;
        self.write_index(&index)
    }

    /// Stage several paths with a single index write.
    pub fn add_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let mut index = self.index()?;
        for path in paths {
            let rel = from_os_path(&self.work_tree, path.as_ref())?;
            self.add_to(&mut index, rel.as_bstr())?;
        }
        self.write_index(&index)
    }

    pub(crate) fn add_to(&self, index: &mut Index, rel: &BStr) -> Result<()> {
        let full = self.work_path(rel);
        let is_dir = rel.is_empty() || full.symlink_metadata().is_ok_and(|m| m.is_dir());

        if is_dir {
            let files = self.scan_work_tree(rel)?;
            let tracked: Vec<BString> = index
                .iter()
                .filter(|e| is_under(e.path.as_bstr(), rel))
                .map(|e| e.path.clone())
                .collect();
            if files.is_empty() && tracked.is_empty() {
                return Err(RepoError::PathNotFound(BString::from(rel)));
            }
            for path in tracked.iter().filter(|p| !files.contains(*p)) {
                index.remove_path(path.as_bstr());
            }
            for path in &files {
                self.add_file(index, path.as_bstr())?;
            }
            // A directory replacing a tracked file of the same name.
            if !rel.is_empty() {
                index.remove_path(rel);
            }
            return Ok(());
        }

        if !self.add_file(index, rel)? {
            if index.contains_path(rel) {
                index.remove_path(rel);
                debug!(path = %rel, "staged deletion");
            } else {
                return Err(RepoError::PathNotFound(BString::from(rel)));
            }
        }
        Ok(())
    }

    /// Stage one file. `false` if it does not exist.
    fn add_file(&self, index: &mut Index, rel: &BStr) -> Result<bool> {
        let Some(file) = self.read_work_file(rel)? else {
            return Ok(false);
        };
        // A file replacing a tracked directory, or a tracked file that is
        // now one of this path's parents.
        index.remove_dir(rel);
        let mut parent = dirname(rel);
        while !parent.is_empty() {
            index.remove_path(parent);
            parent = dirname(parent);
        }
        let oid = self.stage_work_file(index, rel, file)?;
        debug!(path = %rel, %oid, "staged");
        Ok(true)
    }

    /// Unstage `path` so the next commit drops it. Unless `cached`, the
    /// work-tree copy is deleted too.
    pub fn remove(&self, path: impl AsRef<Path>, cached: bool) -> Result<()> {
        let rel = from_os_path(&self.work_tree, path.as_ref())?;
        let rel = rel.as_bstr();
        let mut index = self.index()?;

        let mut doomed: Vec<BString> = index
            .iter()
            .filter(|e| e.path.as_bstr() == rel || is_under(e.path.as_bstr(), rel))
            .map(|e| e.path.clone())
            .collect();
        doomed.dedup();
        if doomed.is_empty() {
            return Err(RepoError::PathNotFound(BString::from(rel)));
        }
        for path in &doomed {
            index.remove_path(path.as_bstr());
        }
        self.write_index(&index)?;

        if !cached {
            for path in &doomed {
                self.remove_work_file(path.as_bstr())?;
            }
        }
        debug!(path = %rel, count = doomed.len(), cached, "removed from index");
        Ok(())
    }
}
