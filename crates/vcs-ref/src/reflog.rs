//! Append-only history of a ref's values, one line per update:
//! `<old> <new> <name> <<email>> <time> <tz>\t<message>`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use bstr::{BStr, BString, ByteSlice, ByteVec};
use vcs_hash::ObjectId;
use vcs_utils::Signature;

use crate::RefError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: ObjectId,
    pub new: ObjectId,
    pub signature: Signature,
    pub message: BString,
}

impl ReflogEntry {
    pub fn parse(line: &BStr) -> Result<Self, RefError> {
        let malformed = |reason: &str| RefError::Malformed {
            name: "reflog".to_owned(),
            reason: reason.to_owned(),
        };
        let (old, rest) = line.split_once_str(" ").ok_or_else(|| malformed("missing old id"))?;
        let (new, rest) = rest.split_once_str(" ").ok_or_else(|| malformed("missing new id"))?;
        let (who, message) = rest.split_once_str("\t").unwrap_or((rest, &b""[..]));
        let oid = |hex: &[u8]| -> Result<ObjectId, RefError> {
            let hex = std::str::from_utf8(hex).map_err(|_| malformed("non-ASCII id"))?;
            Ok(ObjectId::from_hex(hex)?)
        };
        Ok(Self {
            old: oid(old)?,
            new: oid(new)?,
            signature: Signature::parse(who.as_bstr()).map_err(|e| malformed(&e.to_string()))?,
            message: BString::from(message),
        })
    }

    pub fn to_bytes(&self) -> BString {
        let mut out = BString::from(self.old.to_hex());
        out.push_byte(b' ');
        out.push_str(self.new.to_hex());
        out.push_byte(b' ');
        out.push_str(self.signature.to_bytes());
        out.push_byte(b'\t');
        // A newline would split the entry.
        out.extend(self.message.iter().map(|&b| if b == b'\n' { b' ' } else { b }));
        out
    }
}

pub(crate) fn append(path: &Path, entry: &ReflogEntry) -> Result<(), RefError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = entry.to_bytes();
    line.push_byte(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;
    Ok(())
}

/// Entries oldest first. A missing log is empty.
pub(crate) fn read(path: &Path) -> Result<Vec<ReflogEntry>, RefError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    data.lines()
        .filter(|l| !l.is_empty())
        .map(|l| ReflogEntry::parse(l.as_bstr()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_hash::HashAlgorithm;
    use vcs_utils::Time;

    #[test]
    fn line_format() {
        let entry = ReflogEntry {
            old: HashAlgorithm::Sha1.null_oid(),
            new: "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0".parse().unwrap(),
            signature: Signature::new("A", "a@x", Time::new(100, 0)),
            message: "commit: first\nsecond line".into(),
        };
        let bytes = entry.to_bytes();
        assert_eq!(
            bytes,
            "0000000000000000000000000000000000000000 b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0 A <a@x> 100 +0000\tcommit: first second line"
        );
        let parsed = ReflogEntry::parse(bytes.as_bstr()).unwrap();
        assert_eq!(parsed.new, entry.new);
        assert_eq!(parsed.message, "commit: first second line");
    }
}
