//! Content-addressed object database.
//!
//! Objects are stored loose, one compressed file each. Every read is
//! verified against its id. Every write of a tree, commit or tag first
//! checks that the objects it points at are already stored with the right
//! type, so the store never holds a dangling reference it created itself.
//!
//! Parsed objects are cached in memory together with the length and
//! modification time of the file they came from. A cache hit whose file has
//! since vanished or changed is dropped and the file is read again, so a
//! damaged object is reported even by a handle that read it before.

mod error;
mod loose;

pub use error::OdbError;
pub use loose::LooseStore;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use lru::LruCache;
use tracing::debug;
use vcs_hash::zlib::{self, Compression};
use vcs_hash::{HashAlgorithm, ObjectId};
use vcs_object::{Blob, Commit, FileMode, Object, ObjectType, Tag, Tree};

pub type Result<T> = std::result::Result<T, OdbError>;

const CACHE_CAPACITY: usize = 1024;

/// Shortest abbreviation accepted by [`ObjectDatabase::resolve_prefix`].
pub const MIN_PREFIX_LEN: usize = 4;

/// Type and size of a stored object, read without inflating the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectType,
    pub size: usize,
}

/// Identity of the loose file a cached object was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

struct CachedObject {
    object: Object,
    stamp: FileStamp,
}

pub struct ObjectDatabase {
    loose: LooseStore,
    cache: Mutex<LruCache<ObjectId, CachedObject>>,
    algo: HashAlgorithm,
}

impl ObjectDatabase {
    /// Create the objects directory if needed and open it.
    pub fn init(objects_dir: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self> {
        std::fs::create_dir_all(objects_dir.as_ref())?;
        Self::open(objects_dir, algo)
    }

    pub fn open(objects_dir: impl AsRef<Path>, algo: HashAlgorithm) -> Result<Self> {
        let objects_dir = objects_dir.as_ref();
        if !objects_dir.is_dir() {
            return Err(OdbError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no object directory at {}", objects_dir.display()),
            )));
        }
        Ok(Self::with_compression(objects_dir, algo, Compression::default()))
    }

    /// Open with an explicit `core.compression` level.
    pub fn with_compression(
        objects_dir: impl AsRef<Path>,
        algo: HashAlgorithm,
        compression: Compression,
    ) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            loose: LooseStore::new(objects_dir, algo, compression),
            cache: Mutex::new(LruCache::new(capacity)),
            algo,
        }
    }

    pub fn set_compression_level(&mut self, level: i64) {
        let dir = self.loose.objects_dir().to_path_buf();
        self.loose = LooseStore::new(dir, self.algo, zlib::level(level));
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    pub fn objects_dir(&self) -> &Path {
        self.loose.objects_dir()
    }

    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.loose.object_path(oid)
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.loose.contains(oid)
    }

    fn cache_lock(&self) -> std::sync::MutexGuard<'_, LruCache<ObjectId, CachedObject>> {
        // A panic while holding the lock cannot leave a half-inserted entry.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The cached object for `oid` if its file is unchanged since it was
    /// parsed. Stale entries are evicted.
    fn cached(&self, oid: &ObjectId) -> Option<Object> {
        let current = FileStamp::of(&self.loose.object_path(oid));
        let mut cache = self.cache_lock();
        let hit = cache.get(oid)?;
        if Some(hit.stamp) == current {
            return Some(hit.object.clone());
        }
        debug!(%oid, "object file changed on disk, dropping cached copy");
        cache.pop(oid);
        None
    }

    fn remember(&self, oid: ObjectId, object: Object) {
        if let Some(stamp) = FileStamp::of(&self.loose.object_path(&oid)) {
            self.cache_lock().put(oid, CachedObject { object, stamp });
        }
    }

    /// Read and verify an object. Missing objects are `None`.
    pub fn try_read(&self, oid: &ObjectId) -> Result<Option<Object>> {
        if let Some(obj) = self.cached(oid) {
            return Ok(Some(obj));
        }
        self.try_read_uncached(oid)
    }

    /// Read, inflate and verify the stored file, ignoring the cache.
    pub fn try_read_uncached(&self, oid: &ObjectId) -> Result<Option<Object>> {
        let Some((kind, payload)) = self.loose.read(oid)? else {
            return Ok(None);
        };
        let obj = Object::parse_content(kind, &payload, self.algo).map_err(|e| {
            tracing::warn!(%oid, error = %e, "stored object does not parse");
            OdbError::Corrupt {
                oid: *oid,
                reason: e.to_string(),
            }
        })?;
        self.remember(*oid, obj.clone());
        Ok(Some(obj))
    }

    /// Re-read an object from disk and check it against its id, for callers
    /// that must not trust a copy read earlier.
    pub fn verify(&self, oid: &ObjectId) -> Result<()> {
        self.try_read_uncached(oid)?.map(|_| ()).ok_or(OdbError::NotFound(*oid))
    }

    /// Read and verify an object, failing with `NotFound` if absent.
    pub fn read(&self, oid: &ObjectId) -> Result<Object> {
        self.try_read(oid)?.ok_or(OdbError::NotFound(*oid))
    }

    pub fn read_header(&self, oid: &ObjectId) -> Result<ObjectInfo> {
        if let Some(obj) = self.cached(oid) {
            return Ok(ObjectInfo {
                kind: obj.object_type(),
                size: obj.serialize_content().len(),
            });
        }
        let (kind, size) = self.loose.read_header(oid)?.ok_or(OdbError::NotFound(*oid))?;
        Ok(ObjectInfo { kind, size })
    }

    pub fn read_blob(&self, oid: &ObjectId) -> Result<Blob> {
        let obj = self.read(oid)?;
        let actual = obj.object_type();
        obj.into_blob().ok_or_else(|| wrong_type(oid, ObjectType::Blob, actual))
    }

    pub fn read_tree(&self, oid: &ObjectId) -> Result<Tree> {
        let obj = self.read(oid)?;
        let actual = obj.object_type();
        obj.into_tree().ok_or_else(|| wrong_type(oid, ObjectType::Tree, actual))
    }

    pub fn read_commit(&self, oid: &ObjectId) -> Result<Commit> {
        let obj = self.read(oid)?;
        let actual = obj.object_type();
        obj.into_commit().ok_or_else(|| wrong_type(oid, ObjectType::Commit, actual))
    }

    pub fn read_tag(&self, oid: &ObjectId) -> Result<Tag> {
        let obj = self.read(oid)?;
        let actual = obj.object_type();
        obj.into_tag().ok_or_else(|| wrong_type(oid, ObjectType::Tag, actual))
    }

    /// Follow annotated tags until a commit is reached.
    pub fn peel_to_commit(&self, oid: &ObjectId) -> Result<(ObjectId, Commit)> {
        let mut current = *oid;
        loop {
            match self.read(&current)? {
                Object::Commit(c) => return Ok((current, c)),
                Object::Tag(t) => current = t.target,
                other => return Err(wrong_type(&current, ObjectType::Commit, other.object_type())),
            }
        }
    }

    /// The root tree of a commit, tag or tree id.
    pub fn peel_to_tree(&self, oid: &ObjectId) -> Result<(ObjectId, Tree)> {
        match self.read(oid)? {
            Object::Tree(t) => Ok((*oid, t)),
            _ => {
                let (_, commit) = self.peel_to_commit(oid)?;
                Ok((commit.tree, self.read_tree(&commit.tree)?))
            }
        }
    }

    /// Store an object after checking everything it references is present.
    pub fn write(&self, obj: &Object) -> Result<ObjectId> {
        self.check_references(obj)?;
        let oid = self.loose.write(obj.object_type(), &obj.serialize_content())?;
        self.remember(oid, obj.clone());
        Ok(oid)
    }

    pub fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        self.loose.write(ObjectType::Blob, data)
    }

    /// Store a payload of the given type. Anything but a blob is parsed
    /// first so malformed trees, commits and tags never reach the store.
    pub fn write_raw(&self, kind: ObjectType, payload: &[u8]) -> Result<ObjectId> {
        if kind == ObjectType::Blob {
            return self.write_blob(payload);
        }
        let obj = Object::parse_content(kind, payload, self.algo)?;
        self.check_references(&obj)?;
        self.loose.write(kind, payload)
    }

    fn expect_stored(&self, from: ObjectType, oid: &ObjectId, expected: ObjectType) -> Result<()> {
        match self.read_header(oid) {
            Ok(info) if info.kind == expected => Ok(()),
            Ok(info) => Err(wrong_type(oid, expected, info.kind)),
            Err(OdbError::NotFound(_)) => {
                debug!(%oid, %from, "refusing write with dangling reference");
                Err(OdbError::MissingReference {
                    kind: from,
                    missing: *oid,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn check_references(&self, obj: &Object) -> Result<()> {
        match obj {
            Object::Blob(_) => Ok(()),
            Object::Tree(tree) => {
                tree.validate()?;
                for entry in tree.iter() {
                    let expected = match entry.mode {
                        FileMode::Gitlink => continue,
                        FileMode::Tree => ObjectType::Tree,
                        _ => ObjectType::Blob,
                    };
                    self.expect_stored(ObjectType::Tree, &entry.oid, expected)?;
                }
                Ok(())
            }
            Object::Commit(commit) => {
                self.expect_stored(ObjectType::Commit, &commit.tree, ObjectType::Tree)?;
                for parent in &commit.parents {
                    self.expect_stored(ObjectType::Commit, parent, ObjectType::Commit)?;
                }
                Ok(())
            }
            Object::Tag(tag) => self.expect_stored(ObjectType::Tag, &tag.target, tag.target_type),
        }
    }

    /// Ids of every stored object.
    pub fn iter(&self) -> Result<Vec<ObjectId>> {
        self.loose.iter()
    }

    /// Expand an abbreviated hex id to the unique stored object it names.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId> {
        let not_found = || OdbError::NoMatch(prefix.to_owned());
        if prefix.len() < MIN_PREFIX_LEN
            || prefix.len() > self.algo.hex_len()
            || !vcs_hash::hex::is_hex(prefix)
        {
            return Err(OdbError::InvalidPrefix(prefix.to_owned()));
        }
        if prefix.len() == self.algo.hex_len() {
            let oid = ObjectId::from_hex(prefix)?;
            return if self.contains(&oid) { Ok(oid) } else { Err(OdbError::NotFound(oid)) };
        }

        let fanout = self.objects_dir().join(prefix[..2].to_ascii_lowercase());
        let rest = &prefix[2..];
        let mut found = Vec::new();
        let dir = match std::fs::read_dir(&fanout) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        for file in dir {
            let name = file?.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.len() >= rest.len() && name[..rest.len()].eq_ignore_ascii_case(rest) {
                if let Ok(oid) = ObjectId::from_hex(&format!("{}{name}", &prefix[..2])) {
                    found.push(oid);
                }
            }
        }
        match found.len() {
            0 => Err(not_found()),
            1 => Ok(found[0]),
            count => Err(OdbError::Ambiguous {
                prefix: prefix.to_owned(),
                count,
            }),
        }
    }
}

fn wrong_type(oid: &ObjectId, expected: ObjectType, actual: ObjectType) -> OdbError {
    OdbError::WrongType {
        oid: *oid,
        expected,
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_object::TreeEntry;
    use vcs_utils::{ErrorKind, Signature, Time};

    fn odb() -> (tempfile::TempDir, ObjectDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = ObjectDatabase::init(dir.path().join("objects"), HashAlgorithm::Sha1).unwrap();
        (dir, db)
    }

    fn sig() -> Signature {
        Signature::new("T", "t@example.com", Time::new(1700000000, 0))
    }

    #[test]
    fn missing_object_is_not_found() {
        let (_dir, db) = odb();
        let oid = HashAlgorithm::Sha1.null_oid();
        let err = db.read(&oid).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(db.try_read(&oid).unwrap().is_none());
    }

    #[test]
    fn commit_requires_its_tree() {
        let (_dir, db) = odb();
        let tree: ObjectId = "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap();
        let commit = Object::Commit(Commit::new(tree, vec![], sig(), "msg\n"));
        let err = db.write(&commit).unwrap_err();
        assert!(matches!(err, OdbError::MissingReference { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(db.iter().unwrap().is_empty());

        let written = db.write(&Object::Tree(Tree::new())).unwrap();
        assert_eq!(written, tree);
        let id = db.write(&commit).unwrap();
        assert_eq!(db.read_commit(&id).unwrap().tree, tree);
    }

    #[test]
    fn tree_entries_must_have_matching_types() {
        let (_dir, db) = odb();
        let blob = db.write_blob(b"data").unwrap();
        let bad = Tree::from_entries(vec![TreeEntry::new(FileMode::Tree, "d", blob)]).unwrap();
        assert!(matches!(db.write(&Object::Tree(bad)), Err(OdbError::WrongType { .. })));

        let gitlink = Tree::from_entries(vec![TreeEntry::new(
            FileMode::Gitlink,
            "sub",
            HashAlgorithm::Sha1.null_oid(),
        )])
        .unwrap();
        assert!(db.write(&Object::Tree(gitlink)).is_ok());
    }

    #[test]
    fn typed_read_reports_wrong_type() {
        let (_dir, db) = odb();
        let blob = db.write_blob(b"data").unwrap();
        let err = db.read_tree(&blob).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn write_raw_validates() {
        let (_dir, db) = odb();
        assert!(db.write_raw(ObjectType::Tree, b"garbage").is_err());
        assert!(db.iter().unwrap().is_empty());
    }

    #[test]
    fn abbreviated_ids() {
        let (_dir, db) = odb();
        let oid = db.write_blob(b"hello").unwrap();
        assert_eq!(db.resolve_prefix("b6fc4c").unwrap(), oid);
        assert_eq!(db.resolve_prefix("B6FC4C").unwrap(), oid);
        assert!(db.resolve_prefix("b6f").is_err());
        assert!(db.resolve_prefix("0000").is_err());
    }
}
