//! Replaying a patch onto a directory.
//!
//! Every file's new content is computed in memory before anything is
//! written. If any hunk fails to match, nothing on disk changes. Writes go
//! to temporary files that are renamed into place only once all of them
//! have been prepared.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use bstr::{BStr, BString, ByteSlice, ByteVec};
use tracing::{debug, info};
use vcs_config::Config;
use vcs_object::FileMode;
use vcs_utils::path::{to_os_path, validate_repo_path};
use vcs_utils::tempfile::AtomicFile;

use crate::algorithm::split_lines;
use crate::patch::{FilePatch, Patch};
use crate::{DiffError, DiffLine, FileStatus, Hunk, Result};

/// How strictly context and deleted lines must match the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPolicy {
    #[default]
    Strict,
    /// Lines match if they agree once all whitespace is removed.
    IgnoreWhitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyOptions {
    /// Check that the patch applies without touching the filesystem.
    pub dry_run: bool,
    pub policy: ContextPolicy,
    /// How many lines a hunk may have drifted from its stated position.
    pub max_offset: usize,
}

impl ApplyOptions {
    /// `apply.contextPolicy` and `apply.maxOffset`, strict and zero by
    /// default.
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = match config.choice(
            "apply.contextPolicy",
            &["strict", "ignore-whitespace"],
            "strict",
        )? {
            "ignore-whitespace" => ContextPolicy::IgnoreWhitespace,
            _ => ContextPolicy::Strict,
        };
        let max_offset = config.int_in("apply.maxOffset", 0..=i64::from(u32::MAX), 0)? as usize;
        Ok(Self {
            dry_run: false,
            policy,
            max_offset,
        })
    }
}

/// Apply `patch` under `target_dir`. A hunk that does not match yields
/// `Ok(false)` and leaves the directory untouched.
pub fn apply(patch: &Patch, target_dir: &Path, dry_run: bool) -> Result<bool> {
    let opts = ApplyOptions {
        dry_run,
        ..ApplyOptions::default()
    };
    match apply_with(patch, target_dir, &opts) {
        Ok(_) => Ok(true),
        Err(DiffError::PatchConflict { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Apply `patch` under `target_dir` and return every path it touched
/// (including deleted and renamed-away paths).
pub fn apply_with(patch: &Patch, target_dir: &Path, opts: &ApplyOptions) -> Result<Vec<BString>> {
    // Final state per path: `None` means deleted.
    let mut results: BTreeMap<BString, Option<(Vec<u8>, FileMode)>> = BTreeMap::new();

    for file in &patch.files {
        for path in [&file.old_path, &file.new_path] {
            validate_repo_path(path.as_bstr()).map_err(|_| DiffError::UnsafePath(path.clone()))?;
        }
        if file.is_binary {
            return Err(DiffError::BinaryPatch(file.new_path.clone()));
        }

        let current = if file.status == FileStatus::Added {
            if exists(&results, target_dir, file.new_path.as_bstr())? {
                return Err(DiffError::TargetExists(file.new_path.clone()));
            }
            None
        } else {
            Some(read_current(&results, target_dir, file.old_path.as_bstr())?)
        };
        if matches!(file.status, FileStatus::Renamed | FileStatus::Copied)
            && exists(&results, target_dir, file.new_path.as_bstr())?
        {
            return Err(DiffError::TargetExists(file.new_path.clone()));
        }

        let (old_data, old_mode) = current.unwrap_or((Vec::new(), FileMode::Regular));
        let new_data = patch_content(file, &old_data, opts)?;
        let new_mode = file.new_mode.unwrap_or(old_mode);

        if file.status == FileStatus::Deleted {
            if !new_data.is_empty() {
                // The patch removes less than the file holds.
                return Err(DiffError::PatchConflict {
                    path: file.old_path.clone(),
                    hunk: file.hunks.len(),
                });
            }
            results.insert(file.old_path.clone(), None);
            continue;
        }
        if file.status == FileStatus::Renamed {
            results.insert(file.old_path.clone(), None);
        }
        results.insert(file.new_path.clone(), Some((new_data, new_mode)));
    }

    let touched: Vec<BString> = results.keys().cloned().collect();
    if opts.dry_run {
        debug!(files = touched.len(), "patch applies cleanly");
        return Ok(touched);
    }
    commit(target_dir, results)?;
    info!(files = touched.len(), "applied patch");
    Ok(touched)
}

fn exists(
    results: &BTreeMap<BString, Option<(Vec<u8>, FileMode)>>,
    dir: &Path,
    path: &BStr,
) -> Result<bool> {
    if let Some(state) = results.get(path) {
        return Ok(state.is_some());
    }
    Ok(fs::symlink_metadata(to_os_path(dir, path)).is_ok())
}

fn read_current(
    results: &BTreeMap<BString, Option<(Vec<u8>, FileMode)>>,
    dir: &Path,
    path: &BStr,
) -> Result<(Vec<u8>, FileMode)> {
    match results.get(path) {
        Some(Some(state)) => return Ok(state.clone()),
        Some(None) => return Err(DiffError::MissingTarget(path.to_owned())),
        None => {}
    }
    let full = to_os_path(dir, path);
    let meta = match fs::symlink_metadata(&full) {
        Ok(meta) if !meta.is_dir() => meta,
        Ok(_) => return Err(DiffError::MissingTarget(path.to_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DiffError::MissingTarget(path.to_owned()))
        }
        Err(e) => return Err(e.into()),
    };
    let mode = vcs_index::mode_from_metadata(&meta);
    let data = if meta.file_type().is_symlink() {
        Vec::from_os_string(fs::read_link(&full)?.into_os_string()).unwrap_or_default()
    } else {
        fs::read(&full)?
    };
    Ok((data, mode))
}

fn same_line(policy: ContextPolicy, a: &[u8], b: &[u8]) -> bool {
    match policy {
        ContextPolicy::Strict => a == b,
        ContextPolicy::IgnoreWhitespace => a
            .iter()
            .filter(|c| !c.is_ascii_whitespace())
            .eq(b.iter().filter(|c| !c.is_ascii_whitespace())),
    }
}

/// Whether `hunk`'s old side matches `lines` starting at `at`.
fn matches_at(hunk: &Hunk, lines: &[&[u8]], at: usize, policy: ContextPolicy) -> bool {
    let mut i = at;
    for line in &hunk.lines {
        let expected = match line {
            DiffLine::Context(t) | DiffLine::Deletion(t) => t,
            DiffLine::Addition(_) => continue,
        };
        match lines.get(i) {
            Some(actual) if same_line(policy, actual, expected) => i += 1,
            _ => return false,
        }
    }
    true
}

/// Nearest position to `want`, no earlier than `floor` and within
/// `max_offset` lines, where the hunk matches.
fn locate(hunk: &Hunk, lines: &[&[u8]], want: usize, floor: usize, opts: &ApplyOptions) -> Option<usize> {
    let fits = |at: usize| at >= floor && matches_at(hunk, lines, at, opts.policy);
    for off in 0..=opts.max_offset {
        if fits(want + off) {
            return Some(want + off);
        }
        if off > 0 && want >= off && fits(want - off) {
            return Some(want - off);
        }
    }
    None
}

fn patch_content(file: &FilePatch, old: &[u8], opts: &ApplyOptions) -> Result<Vec<u8>> {
    let lines = split_lines(old);
    let mut out = Vec::with_capacity(old.len());
    let mut cursor = 0;

    for (n, hunk) in file.hunks.iter().enumerate() {
        // Unified numbering: an empty old range names the line before it.
        let want = if hunk.old_count == 0 {
            hunk.old_start as usize
        } else {
            (hunk.old_start as usize).saturating_sub(1)
        };
        let at = locate(hunk, &lines, want, cursor, opts).ok_or_else(|| DiffError::PatchConflict {
            path: file.old_path.clone(),
            hunk: n + 1,
        })?;

        for line in &lines[cursor..at] {
            out.extend_from_slice(line);
        }
        let mut i = at;
        for line in &hunk.lines {
            match line {
                // Keep the target's own bytes; they may differ in whitespace.
                DiffLine::Context(_) => {
                    out.extend_from_slice(lines[i]);
                    i += 1;
                }
                DiffLine::Deletion(_) => i += 1,
                DiffLine::Addition(t) => out.extend_from_slice(t),
            }
        }
        cursor = i;
    }
    for line in &lines[cursor..] {
        out.extend_from_slice(line);
    }
    Ok(out)
}

fn commit(dir: &Path, results: BTreeMap<BString, Option<(Vec<u8>, FileMode)>>) -> Result<()> {
    let mut pending = Vec::new();
    let mut removals = Vec::new();
    for (path, state) in results {
        let full = to_os_path(dir, path.as_bstr());
        match state {
            Some((data, mode)) => {
                if mode == FileMode::Symlink {
                    pending.push(Pending::Symlink(full, data));
                } else {
                    let mut file = AtomicFile::new(&full)?;
                    file.write_all(&data)?;
                    pending.push(Pending::File(file, mode));
                }
            }
            None => removals.push(full),
        }
    }

    for item in pending {
        match item {
            Pending::File(file, mode) => {
                let target = file.target().to_path_buf();
                if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
                    fs::remove_file(&target)?;
                }
                file.persist()?;
                set_mode(&target, mode)?;
            }
            Pending::Symlink(full, data) => write_symlink(&full, &data)?,
        }
    }
    for full in removals {
        match fs::remove_file(&full) {
            Ok(()) => prune_empty_parents(dir, &full),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

enum Pending {
    File(AtomicFile, FileMode),
    Symlink(std::path::PathBuf, Vec<u8>),
}

fn prune_empty_parents(root: &Path, file: &Path) {
    let mut dir = file.parent();
    while let Some(d) = dir {
        if d == root || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = if mode == FileMode::Executable { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: FileMode) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_symlink(full: &Path, target: &[u8]) -> Result<()> {
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(full).is_ok() {
        fs::remove_file(full)?;
    }
    std::os::unix::fs::symlink(target.to_os_str_lossy(), full)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(full: &Path, target: &[u8]) -> Result<()> {
    vcs_utils::tempfile::write_atomic(full, target)?;
    Ok(())
}
