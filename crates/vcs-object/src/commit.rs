use bstr::{BStr, BString, ByteSlice};
use vcs_hash::ObjectId;
use vcs_utils::Signature;

use crate::{fields, ObjectError};

/// A snapshot plus its place in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    /// Empty for a root commit, two or more for a merge.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub encoding: Option<BString>,
    /// Detached signature over the rest of the commit, if signed.
    pub gpgsig: Option<BString>,
    /// Headers this implementation does not interpret, kept for round trips.
    pub extra_headers: Vec<(BString, BString)>,
    pub message: BString,
}

fn parse_oid(value: &[u8], field: &str) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader(format!("non-ASCII {field} id")))?;
    Ok(ObjectId::from_hex(hex)?)
}

fn parse_signature(value: &[u8]) -> Result<Signature, ObjectError> {
    Signature::parse(BStr::new(value)).map_err(|e| ObjectError::InvalidSignature(e.to_string()))
}

impl Commit {
    /// A commit with identical author and committer.
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        signature: Signature,
        message: impl Into<BString>,
    ) -> Self {
        Self {
            tree,
            parents,
            author: signature.clone(),
            committer: signature,
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let block = fields::parse(content)?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut encoding = None;
        let mut gpgsig = None;
        let mut extra_headers = Vec::new();

        for (key, value) in block.entries {
            match key {
                b"tree" if tree.is_none() => tree = Some(parse_oid(&value, "tree")?),
                b"parent" => parents.push(parse_oid(&value, "parent")?),
                b"author" if author.is_none() => author = Some(parse_signature(&value)?),
                b"committer" if committer.is_none() => committer = Some(parse_signature(&value)?),
                b"encoding" if encoding.is_none() => encoding = Some(value),
                b"gpgsig" | b"gpgsig-sha256" if gpgsig.is_none() => gpgsig = Some(value),
                _ => extra_headers.push((BString::from(key), value)),
            }
        }

        let missing = |field| ObjectError::MissingField {
            object: "commit",
            field,
        };
        Ok(Self {
            tree: tree.ok_or_else(|| missing("tree"))?,
            parents,
            author: author.ok_or_else(|| missing("author"))?,
            committer: committer.ok_or_else(|| missing("committer"))?,
            encoding,
            gpgsig,
            extra_headers,
            message: BString::from(block.message),
        })
    }

    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.message.len());
        fields::write(&mut out, b"tree", self.tree.to_hex().as_bytes());
        for parent in &self.parents {
            fields::write(&mut out, b"parent", parent.to_hex().as_bytes());
        }
        fields::write(&mut out, b"author", &self.author.to_bytes());
        fields::write(&mut out, b"committer", &self.committer.to_bytes());
        if let Some(encoding) = &self.encoding {
            fields::write(&mut out, b"encoding", encoding);
        }
        if let Some(sig) = &self.gpgsig {
            fields::write(&mut out, b"gpgsig", sig);
        }
        for (key, value) in &self.extra_headers {
            fields::write(&mut out, key, value);
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message.
    pub fn summary(&self) -> &BStr {
        let msg = self.message.trim_start();
        msg.lines().next().unwrap_or_default().as_bstr()
    }

    /// Message after the first paragraph.
    pub fn body(&self) -> Option<&BStr> {
        let msg = self.message.as_bytes();
        let pos = msg.find(b"\n\n")?;
        let body = msg[pos + 2..].trim_start_with(|c| c == '\n');
        (!body.is_empty()).then(|| body.as_bstr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcs_hash::HashAlgorithm;
    use vcs_utils::Time;

    fn sig() -> Signature {
        Signature::new("A U Thor", "author@example.com", Time::new(1112911993, -420))
    }

    #[test]
    fn matches_reference_bytes() {
        let tree: ObjectId = "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap();
        let commit = Commit::new(tree, vec![], sig(), "initial\n");
        let expected = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A U Thor <author@example.com> 1112911993 -0700\n\
committer A U Thor <author@example.com> 1112911993 -0700\n\
\n\
initial\n";
        assert_eq!(commit.serialize_content(), expected.to_vec());
        assert_eq!(Commit::parse(expected).unwrap(), commit);
    }

    #[test]
    fn parents_signature_and_unknown_headers_survive() {
        let tree = HashAlgorithm::Sha1.null_oid();
        let p1: ObjectId = "1111111111111111111111111111111111111111".parse().unwrap();
        let p2: ObjectId = "2222222222222222222222222222222222222222".parse().unwrap();
        let mut commit = Commit::new(tree, vec![p1, p2], sig(), "merge\n\nbody text\n");
        commit.gpgsig = Some("-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----".into());
        commit.extra_headers.push(("x-custom".into(), "value".into()));

        let parsed = Commit::parse(&commit.serialize_content()).unwrap();
        assert_eq!(parsed, commit);
        assert!(parsed.is_merge());
        assert_eq!(parsed.first_parent(), Some(&p1));
        assert_eq!(parsed.summary(), "merge");
        assert_eq!(parsed.body().unwrap(), "body text\n");
    }

    #[test]
    fn missing_fields_reported() {
        let err = Commit::parse(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\nmsg").unwrap_err();
        assert!(matches!(err, ObjectError::MissingField { field: "author", .. }));
    }
}
