//! Conversion between work-tree paths and the slash-separated byte paths
//! stored in trees and the index.

use std::path::{Component, Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};

use crate::error::UtilError;
use crate::Result;

/// Name of the repository metadata directory inside a work tree.
pub const REPO_DIR: &str = ".vcs";

/// Check that `path` is a normalized, relative, slash-separated path that
/// stays inside the work tree and does not touch the metadata directory.
pub fn validate_repo_path(path: &BStr) -> Result<()> {
    let invalid = |reason| {
        Err(UtilError::Path {
            path: path.to_str_lossy().into_owned(),
            reason,
        })
    };
    if path.is_empty() {
        return invalid("empty path");
    }
    if path.contains(&0) {
        return invalid("contains NUL");
    }
    for component in path.split_str("/") {
        match component {
            b"" => return invalid("empty component"),
            b"." | b".." => return invalid("relative component"),
            c if c.eq_ignore_ascii_case(REPO_DIR.as_bytes()) => {
                return invalid("inside repository directory")
            }
            _ => {}
        }
    }
    Ok(())
}

/// Join a repository path onto the work-tree root.
pub fn to_os_path(root: &Path, path: &BStr) -> PathBuf {
    let mut out = root.to_path_buf();
    for component in path.split_str("/") {
        out.push(component.to_os_str_lossy());
    }
    out
}

/// Express `path` (absolute, or relative to the work tree) as a repository
/// path. `..` segments are resolved lexically and may not escape the root.
pub fn from_os_path(root: &Path, path: &Path) -> Result<BString> {
    let relative = if path.is_absolute() {
        path.strip_prefix(root).map_err(|_| UtilError::Path {
            path: path.display().to_string(),
            reason: "outside the work tree",
        })?
    } else {
        path
    };

    let mut parts: Vec<Vec<u8>> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let bytes = <[u8]>::from_os_str(name).ok_or_else(|| UtilError::Path {
                    path: path.display().to_string(),
                    reason: "not representable as bytes",
                })?;
                parts.push(bytes.to_vec());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(UtilError::Path {
                        path: path.display().to_string(),
                        reason: "outside the work tree",
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(UtilError::Path {
                    path: path.display().to_string(),
                    reason: "outside the work tree",
                })
            }
        }
    }

    let joined = BString::from(parts.join(&b'/'));
    if !joined.is_empty() {
        validate_repo_path(joined.as_bstr())?;
    }
    Ok(joined)
}

/// Parent directory of a repository path (`""` for top-level entries).
pub fn dirname(path: &BStr) -> &BStr {
    match path.rfind_byte(b'/') {
        Some(pos) => path[..pos].as_bstr(),
        None => BStr::new(b""),
    }
}

/// Final component of a repository path.
pub fn basename(path: &BStr) -> &BStr {
    match path.rfind_byte(b'/') {
        Some(pos) => path[pos + 1..].as_bstr(),
        None => path,
    }
}
