//! The repository handle.
//!
//! A [`Repository`] bundles the object database, ref store and
//! configuration of one `.vcs` directory together with its work tree. There
//! is no process-wide "current repository": every operation takes the
//! handle it works on, so tests can keep several repositories open at once.

mod branch;
mod checkout;
mod commit;
mod error;
mod init;
mod stage;
mod worktree;

pub use branch::Branch;
pub use commit::CommitOptions;
pub use error::RepoError;
pub use init::InitOptions;
pub use worktree::WorkFile;

use std::path::{Path, PathBuf};

use tracing::debug;
use vcs_config::Config;
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_index::{flatten_tree, Index, TreeItem};
use vcs_object::Commit;
use vcs_odb::ObjectDatabase;
use vcs_ref::{RefName, RefStore, RefTransaction};
use vcs_utils::path::REPO_DIR;
use vcs_utils::Signature;

pub type Result<T> = std::result::Result<T, RepoError>;

/// Flattened snapshot: repository path to blob.
pub type PathMap = std::collections::BTreeMap<bstr::BString, TreeItem>;

pub struct Repository {
    work_tree: PathBuf,
    repo_dir: PathBuf,
    odb: ObjectDatabase,
    refs: RefStore,
    config: Config,
    algo: HashAlgorithm,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("work_tree", &self.work_tree)
            .field("algo", &self.algo)
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Create a repository in `path` (which becomes the work tree), or open
    /// the one already there.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        Self::init_opts(path, &InitOptions::default())
    }

    pub fn init_opts(path: impl AsRef<Path>, opts: &InitOptions) -> Result<Self> {
        let work_tree = init::init_repository(path.as_ref(), opts)?;
        Self::open(work_tree)
    }

    /// Open the repository whose work tree is `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let work_tree = path.as_ref().to_path_buf();
        let repo_dir = work_tree.join(REPO_DIR);
        if !repo_dir.join("HEAD").is_file() {
            return Err(RepoError::NotARepository(work_tree));
        }

        let config = Config::load(repo_dir.join("config"))?;
        let algo: HashAlgorithm = config
            .choice("core.hashAlgorithm", &["sha1", "sha256"], "sha1")?
            .parse()?;
        let mut odb = ObjectDatabase::open(repo_dir.join("objects"), algo)?;
        odb.set_compression_level(config.int_in("core.compression", -1..=9, -1)?);
        let refs = RefStore::new(&repo_dir);

        debug!(work_tree = %work_tree.display(), algo = algo.name(), "opened repository");
        Ok(Self {
            work_tree,
            repo_dir,
            odb,
            refs,
            config,
            algo,
        })
    }

    /// Find the repository containing `start`, walking up the directory tree.
    pub fn discover(start: impl AsRef<Path>) -> Result<Self> {
        let start = start.as_ref();
        let mut dir = Some(start);
        while let Some(d) = dir {
            if d.join(REPO_DIR).join("HEAD").is_file() {
                return Self::open(d);
            }
            dir = d.parent();
        }
        Err(RepoError::NotARepository(start.to_path_buf()))
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// The `.vcs` directory.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn odb(&self) -> &ObjectDatabase {
        &self.odb
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Change a setting and persist it.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.config.set(key, value)?;
        self.config.write_to(self.repo_dir.join("config"))?;
        Ok(())
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.algo
    }

    pub fn index_path(&self) -> PathBuf {
        self.repo_dir.join("index")
    }

    /// Load the index from disk. Each call reads it afresh.
    pub fn index(&self) -> Result<Index> {
        Ok(Index::load(self.index_path(), self.algo)?)
    }

    pub fn write_index(&self, index: &Index) -> Result<()> {
        index.write_to(self.index_path())?;
        Ok(())
    }

    /// `user.name` and `user.email` stamped with the current time.
    pub fn signature(&self) -> Result<Signature> {
        self.identity().ok_or(RepoError::NoIdentity)
    }

    fn identity(&self) -> Option<Signature> {
        let name = self.config.get("user.name")?;
        let email = self.config.get("user.email")?;
        Some(Signature::now(name, email))
    }

    /// Commit a ref transaction, logging it under `who` (or the configured
    /// identity; without either no reflog entry is written).
    pub fn update_refs(&self, transaction: RefTransaction, who: Option<&Signature>) -> Result<()> {
        let mut store = RefStore::new(&self.repo_dir);
        if let Some(sig) = who.cloned().or_else(|| self.identity()) {
            store.set_committer(sig);
        }
        store.commit(transaction)?;
        Ok(())
    }

    pub fn head_oid(&self) -> Result<Option<ObjectId>> {
        Ok(self.refs.head_oid()?)
    }

    /// The checked-out branch, `None` when `HEAD` is detached.
    pub fn current_branch(&self) -> Result<Option<RefName>> {
        Ok(self.refs.current_branch()?)
    }

    pub fn is_unborn(&self) -> Result<bool> {
        Ok(self.head_oid()?.is_none())
    }

    pub fn head_commit(&self) -> Result<Option<(ObjectId, Commit)>> {
        match self.head_oid()? {
            Some(oid) => Ok(Some(self.odb.peel_to_commit(&oid)?)),
            None => Ok(None),
        }
    }

    /// Root tree of `HEAD`, or `None` on an unborn branch.
    pub fn head_tree(&self) -> Result<Option<ObjectId>> {
        Ok(self.head_commit()?.map(|(_, c)| c.tree))
    }

    /// Flattened tree of a commit (or of a tree id).
    pub fn commit_paths(&self, oid: &ObjectId) -> Result<PathMap> {
        let (tree, _) = self.odb.peel_to_tree(oid)?;
        Ok(flatten_tree(&self.odb, &tree)?)
    }

    /// Flattened `HEAD` tree; empty when unborn.
    pub fn head_paths(&self) -> Result<PathMap> {
        match self.head_tree()? {
            Some(tree) => Ok(flatten_tree(&self.odb, &tree)?),
            None => Ok(PathMap::new()),
        }
    }

    /// The commit being merged in, if a merge stopped on conflicts.
    pub fn merge_head(&self) -> Result<Option<ObjectId>> {
        Ok(self.refs.resolve(&RefName::new("MERGE_HEAD")?)?)
    }

    pub fn merge_msg_path(&self) -> PathBuf {
        self.repo_dir.join("MERGE_MSG")
    }

    /// Forget an interrupted merge: `MERGE_HEAD` and `MERGE_MSG`.
    pub fn clear_merge_state(&self) -> Result<()> {
        let merge_head = RefName::new("MERGE_HEAD")?;
        if self.refs.exists(&merge_head)? {
            let mut tx = RefTransaction::new();
            tx.delete(merge_head, None, "merge state cleared");
            self.update_refs(tx, None)?;
        }
        match std::fs::remove_file(self.merge_msg_path()) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
