//! One zlib-compressed file per object under `objects/xx/yyyy…`.
//!
//! The stored bytes are `"<type> <size>\0<payload>"` deflated. Reads check
//! the declared size before inflating the payload and re-hash the result,
//! so a damaged file is reported rather than returned.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use vcs_hash::zlib::{self, Compression};
use vcs_hash::{HashAlgorithm, HashError, Hasher, ObjectId};
use vcs_object::{header, ObjectType};
use vcs_utils::tempfile::AtomicFile;

use crate::OdbError;

/// Upper bound on the deflate expansion ratio. Anything claiming more is
/// treated as corrupt before a buffer is allocated for it.
const MAX_INFLATE_RATIO: usize = 1032;

pub struct LooseStore {
    objects_dir: PathBuf,
    algo: HashAlgorithm,
    compression: Compression,
}

impl LooseStore {
    pub fn new(objects_dir: impl AsRef<Path>, algo: HashAlgorithm, compression: Compression) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            algo,
            compression,
        }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    fn read_file(&self, oid: &ObjectId) -> Result<Option<Vec<u8>>, OdbError> {
        match fs::read(self.object_path(oid)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Type and payload size, inflating only the header.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<(ObjectType, usize)>, OdbError> {
        let Some(compressed) = self.read_file(oid)? else {
            return Ok(None);
        };
        let (kind, size, _) = parse_header(oid, &compressed)?;
        Ok(Some((kind, size)))
    }

    /// Verified type and payload.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        let Some(compressed) = self.read_file(oid)? else {
            return Ok(None);
        };
        let (kind, size, header_len) = parse_header(oid, &compressed)?;

        if size > compressed.len().saturating_mul(MAX_INFLATE_RATIO).saturating_add(64) {
            return Err(corrupt(
                oid,
                format!("declared size {size} exceeds what {} compressed bytes can hold", compressed.len()),
            ));
        }

        let total = header_len.saturating_add(size);
        let mut raw = zlib::decompress_with_limit(&compressed, total).map_err(|e| match e {
            HashError::OutOfMemory { size } => OdbError::OutOfMemory { oid: *oid, size },
            other => corrupt(oid, other.to_string()),
        })?;
        if raw.len() != total {
            return Err(corrupt(
                oid,
                format!("payload is {} bytes, header declares {size}", raw.len() - header_len),
            ));
        }

        let actual = Hasher::digest(self.algo, &raw).map_err(|e| corrupt(oid, e.to_string()))?;
        if actual != *oid {
            return Err(corrupt(oid, format!("content hashes to {actual}")));
        }

        let payload = raw.split_off(header_len);
        Ok(Some((kind, payload)))
    }

    /// Store an object. Writing an object that already exists is a no-op.
    pub fn write(&self, kind: ObjectType, payload: &[u8]) -> Result<ObjectId, OdbError> {
        let header = header::encode(kind, payload.len());
        let mut hasher = Hasher::new(self.algo);
        hasher.update(&header);
        hasher.update(payload);
        let oid = hasher.finalize()?;

        let path = self.object_path(&oid);
        if path.is_file() {
            debug!(%oid, %kind, "object already present");
            return Ok(oid);
        }

        let compressed = zlib::compress_parts(&[&header, payload], self.compression)?;
        let mut file = AtomicFile::new(&path)?;
        file.write_all(&compressed)?;
        file.file().sync_all()?;
        set_read_only(file.path())?;
        // Another writer may have won the race; the bytes are identical.
        match file.persist() {
            Ok(()) => {}
            Err(_) if path.is_file() => {}
            Err(e) => return Err(e.into()),
        }
        debug!(%oid, %kind, size = payload.len(), "wrote object");
        Ok(oid)
    }

    /// Every object id present, in no particular order. Files whose names
    /// are not valid ids are skipped.
    pub fn iter(&self) -> Result<Vec<ObjectId>, OdbError> {
        let mut out = Vec::new();
        let fanout = match fs::read_dir(&self.objects_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for dir in fanout {
            let dir = dir?;
            let prefix = dir.file_name();
            let Some(prefix) = prefix.to_str().filter(|p| p.len() == 2 && vcs_hash::hex::is_hex(p))
            else {
                continue;
            };
            if !dir.file_type()?.is_dir() {
                continue;
            }
            for file in fs::read_dir(dir.path())? {
                let name = file?.file_name();
                let Some(rest) = name.to_str() else { continue };
                if rest.len() + 2 != self.algo.hex_len() {
                    continue;
                }
                if let Ok(oid) = ObjectId::from_hex(&format!("{prefix}{rest}")) {
                    out.push(oid);
                }
            }
        }
        Ok(out)
    }
}

fn corrupt(oid: &ObjectId, reason: String) -> OdbError {
    warn!(%oid, %reason, "corrupt object");
    OdbError::Corrupt { oid: *oid, reason }
}

fn parse_header(oid: &ObjectId, compressed: &[u8]) -> Result<(ObjectType, usize, usize), OdbError> {
    let prefix = zlib::decompress_prefix(compressed, header::MAX_HEADER_LEN)
        .map_err(|e| corrupt(oid, e.to_string()))?;
    header::parse(&prefix).map_err(|e| corrupt(oid, e.to_string()))
}

#[cfg(unix)]
fn set_read_only(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o444))
}

#[cfg(not(unix))]
fn set_read_only(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> LooseStore {
        LooseStore::new(dir, HashAlgorithm::Sha1, Compression::default())
    }

    #[test]
    fn write_read_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let oid = s.write(ObjectType::Blob, b"hello").unwrap();
        assert_eq!(oid.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert!(dir.path().join("b6").join("fc4c620b67d95f953a5c1c1230aaab5db5a1b0").is_file());
        assert_eq!(s.read(&oid).unwrap(), Some((ObjectType::Blob, b"hello".to_vec())));
        assert_eq!(s.read_header(&oid).unwrap(), Some((ObjectType::Blob, 5)));
        assert_eq!(s.iter().unwrap(), vec![oid]);
    }

    #[test]
    fn rewrite_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let a = s.write(ObjectType::Blob, b"x").unwrap();
        let b = s.write(ObjectType::Blob, b"x").unwrap();
        assert_eq!(a, b);
        assert_eq!(s.iter().unwrap().len(), 1);
    }

    #[test]
    fn inflated_size_claim_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(dir.path());
        let oid = HashAlgorithm::Sha1.null_oid();
        let bogus = zlib::compress(b"blob 99999999999\0x", Compression::default()).unwrap();
        let path = s.object_path(&oid);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bogus).unwrap();
        assert!(matches!(s.read(&oid), Err(OdbError::Corrupt { .. })));
    }
}
