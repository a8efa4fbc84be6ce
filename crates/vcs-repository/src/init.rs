use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use vcs_config::Config;
use vcs_hash::HashAlgorithm;
use vcs_ref::RefName;
use vcs_utils::lockfile::write_locked;
use vcs_utils::path::REPO_DIR;

use crate::{RepoError, Result};

/// Options for [`Repository::init_opts`](crate::Repository::init_opts).
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub hash_algorithm: HashAlgorithm,
    pub default_branch: String,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Sha1,
            default_branch: "main".to_owned(),
        }
    }
}

/// Lay out a fresh `.vcs` directory under `path` and return the work tree.
///
/// ```text
/// .vcs/HEAD            ref: refs/heads/<default branch>
/// .vcs/config
/// .vcs/objects/
/// .vcs/refs/heads/
/// .vcs/refs/tags/
/// ```
///
/// Running it on an existing repository changes nothing.
pub(crate) fn init_repository(path: &Path, opts: &InitOptions) -> Result<PathBuf> {
    let work_tree = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path.to_path_buf()
    };
    let repo_dir = work_tree.join(REPO_DIR);
    if repo_dir.join("HEAD").is_file() {
        return Ok(work_tree);
    }

    let branch = RefName::branch(&opts.default_branch)?;
    if repo_dir.exists() && !repo_dir.is_dir() {
        return Err(RepoError::NotARepository(repo_dir));
    }

    fs::create_dir_all(repo_dir.join("objects"))?;
    fs::create_dir_all(repo_dir.join("refs").join("heads"))?;
    fs::create_dir_all(repo_dir.join("refs").join("tags"))?;

    let mut config = Config::new();
    config.set("core.repositoryFormatVersion", "0")?;
    config.set("core.hashAlgorithm", opts.hash_algorithm.name())?;
    config.write_to(repo_dir.join("config"))?;

    // HEAD last: its presence is what marks the directory as a repository.
    write_locked(repo_dir.join("HEAD"), format!("ref: {branch}\n").as_bytes())?;

    info!(path = %work_tree.display(), branch = %branch, "initialized repository");
    Ok(work_tree)
}
