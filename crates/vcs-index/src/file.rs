//! The on-disk index format (version 2).
//!
//! ```text
//! "DIRC" | version u32 | count u32 | entries... | extensions... | checksum
//! ```
//!
//! Each entry is ten big-endian u32 stat fields (the mode among them), the
//! raw object id, a u16 flags word and the NUL-terminated path, padded with
//! NULs to a multiple of eight bytes.

use bstr::BString;
use vcs_hash::{HashAlgorithm, Hasher, ObjectId};
use vcs_object::FileMode;

use crate::entry::{IndexEntry, Stage, StatData};
use crate::{cmp_entries, IndexError, Result};

const SIGNATURE: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const HEADER_LEN: usize = 12;
const STAT_LEN: usize = 40;

const NAME_MASK: u16 = 0x0fff;
const STAGE_SHIFT: u16 = 12;
const EXTENDED_FLAG: u16 = 0x4000;

fn corrupt(reason: impl Into<String>) -> IndexError {
    IndexError::Corrupt(reason.into())
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| corrupt(format!("truncated at offset {at}")))
}

fn read_u16(data: &[u8], at: usize) -> Result<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| corrupt(format!("truncated at offset {at}")))
}

/// On-disk size of an entry with a path of `name_len` bytes.
fn entry_len(hash_len: usize, name_len: usize) -> usize {
    (STAT_LEN + hash_len + 2 + name_len + 8) & !7
}

pub(crate) fn parse(data: &[u8], algo: HashAlgorithm) -> Result<Vec<IndexEntry>> {
    let hash_len = algo.digest_len();
    if data.len() < HEADER_LEN + hash_len {
        return Err(corrupt("file too short"));
    }

    let body_end = data.len() - hash_len;
    let expected = Hasher::digest(algo, &data[..body_end])?;
    if expected.as_bytes() != &data[body_end..] {
        return Err(corrupt("checksum mismatch"));
    }

    if &data[..4] != SIGNATURE {
        return Err(corrupt("bad signature"));
    }
    let version = read_u32(data, 4)?;
    if version != VERSION {
        return Err(corrupt(format!("unsupported version {version}")));
    }
    let count = read_u32(data, 8)? as usize;

    let body = &data[..body_end];
    let mut entries: Vec<IndexEntry> = Vec::with_capacity(count.min(body.len() / 62));
    let mut pos = HEADER_LEN;
    for _ in 0..count {
        let (entry, next) = parse_entry(body, pos, algo)?;
        if let Some(prev) = entries.last() {
            if cmp_entries(prev, &entry).is_ge() {
                return Err(corrupt(format!("entry '{}' out of order", entry.path)));
            }
        }
        entries.push(entry);
        pos = next;
    }

    // Extensions carry only caches this implementation does not keep.
    while pos < body.len() {
        let sig = body
            .get(pos..pos + 4)
            .ok_or_else(|| corrupt("truncated extension header"))?;
        let len = read_u32(body, pos + 4)? as usize;
        if !sig[0].is_ascii_uppercase() {
            return Err(corrupt(format!(
                "required extension '{}' not supported",
                String::from_utf8_lossy(sig)
            )));
        }
        pos = pos
            .checked_add(8 + len)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| corrupt("truncated extension"))?;
    }

    Ok(entries)
}

fn parse_entry(data: &[u8], start: usize, algo: HashAlgorithm) -> Result<(IndexEntry, usize)> {
    let hash_len = algo.digest_len();
    let mut fields = [0u32; 10];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = read_u32(data, start + i * 4)?;
    }
    let [ctime_secs, ctime_nsecs, mtime_secs, mtime_nsecs, dev, ino, mode, uid, gid, size] = fields;

    let oid_at = start + STAT_LEN;
    let oid_bytes = data
        .get(oid_at..oid_at + hash_len)
        .ok_or_else(|| corrupt(format!("truncated entry at offset {start}")))?;
    let oid = ObjectId::from_bytes(oid_bytes, algo)?;

    let flags = read_u16(data, oid_at + hash_len)?;
    if flags & EXTENDED_FLAG != 0 {
        return Err(corrupt("extended flags in a version 2 index"));
    }
    let stage = Stage::from_bits((flags >> STAGE_SHIFT) & 0x3)
        .ok_or_else(|| corrupt("invalid stage"))?;

    let name_at = oid_at + hash_len + 2;
    let rest = data
        .get(name_at..)
        .ok_or_else(|| corrupt(format!("truncated entry at offset {start}")))?;
    let name_len = match (flags & NAME_MASK) as usize {
        n if n < NAME_MASK as usize => n,
        _ => rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| corrupt("unterminated path"))?,
    };
    let path = rest
        .get(..name_len)
        .ok_or_else(|| corrupt(format!("truncated path at offset {name_at}")))?;
    if rest.get(name_len) != Some(&0) {
        return Err(corrupt(format!("path at offset {name_at} not NUL-terminated")));
    }

    let mode = FileMode::from_raw(mode)
        .filter(|m| !m.is_tree())
        .ok_or_else(|| corrupt(format!("invalid mode {mode:o} for '{}'", BString::from(path))))?;

    let next = start + entry_len(hash_len, name_len);
    if next > data.len() {
        return Err(corrupt(format!("truncated entry at offset {start}")));
    }

    let entry = IndexEntry {
        path: BString::from(path),
        oid,
        mode,
        stage,
        stat: StatData {
            ctime_secs,
            ctime_nsecs,
            mtime_secs,
            mtime_nsecs,
            dev,
            ino,
            uid,
            gid,
            size,
        },
    };
    Ok((entry, next))
}

pub(crate) fn serialize(entries: &[IndexEntry], algo: HashAlgorithm) -> Result<Vec<u8>> {
    let hash_len = algo.digest_len();
    let mut buf = Vec::with_capacity(HEADER_LEN + entries.len() * 72 + hash_len);
    buf.extend_from_slice(SIGNATURE);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());

    for entry in entries {
        let start = buf.len();
        let s = &entry.stat;
        for field in [
            s.ctime_secs,
            s.ctime_nsecs,
            s.mtime_secs,
            s.mtime_nsecs,
            s.dev,
            s.ino,
            entry.mode.raw(),
            s.uid,
            s.gid,
            s.size,
        ] {
            buf.extend_from_slice(&field.to_be_bytes());
        }
        buf.extend_from_slice(entry.oid.as_bytes());

        let name_len = entry.path.len().min(NAME_MASK as usize) as u16;
        let flags = name_len | (entry.stage.bits() << STAGE_SHIFT);
        buf.extend_from_slice(&flags.to_be_bytes());
        buf.extend_from_slice(&entry.path);

        let padded = entry_len(hash_len, entry.path.len());
        buf.resize(start + padded, 0);
    }

    let checksum = Hasher::digest(algo, &buf)?;
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}
