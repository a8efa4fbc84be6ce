use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{hex, HashAlgorithm, HashError};

/// Digest of an object's canonical form; the object's address.
///
/// Ids are totally ordered by their raw bytes, which is also the order of
/// their hex representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectId {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl ObjectId {
    /// Build an id from a raw digest; the length selects the algorithm.
    pub fn from_bytes(bytes: &[u8], algo: HashAlgorithm) -> Result<Self, HashError> {
        if bytes.len() != algo.digest_len() {
            return Err(HashError::InvalidDigestLength {
                expected: algo.digest_len(),
                actual: bytes.len(),
            });
        }
        Ok(match algo {
            HashAlgorithm::Sha1 => {
                let mut raw = [0u8; 20];
                raw.copy_from_slice(bytes);
                Self::Sha1(raw)
            }
            HashAlgorithm::Sha256 => {
                let mut raw = [0u8; 32];
                raw.copy_from_slice(bytes);
                Self::Sha256(raw)
            }
        })
    }

    /// Parse a full-length hex id; 40 digits is SHA-1, 64 is SHA-256.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        match HashAlgorithm::from_hex_len(s.len()) {
            Some(HashAlgorithm::Sha1) => {
                let mut raw = [0u8; 20];
                hex::decode_into(s, &mut raw)?;
                Ok(Self::Sha1(raw))
            }
            Some(HashAlgorithm::Sha256) => {
                let mut raw = [0u8; 32];
                hex::decode_into(s, &mut raw)?;
                Ok(Self::Sha256(raw))
            }
            None => Err(HashError::InvalidHexLength {
                expected: HashAlgorithm::Sha1.hex_len(),
                actual: s.len(),
            }),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(raw) => raw,
            Self::Sha256(raw) => raw,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Sha1(_) => HashAlgorithm::Sha1,
            Self::Sha256(_) => HashAlgorithm::Sha256,
        }
    }

    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// The first `len` hex digits.
    pub fn to_short_hex(&self, len: usize) -> String {
        let mut full = self.to_hex();
        full.truncate(len.max(4));
        full
    }

    /// Case-insensitive hex prefix test, used for abbreviated ids.
    pub fn has_hex_prefix(&self, prefix: &str) -> bool {
        let full = self.to_hex();
        full.len() >= prefix.len() && full[..prefix.len()].eq_ignore_ascii_case(prefix)
    }

    /// Fan-out directory and file name of the loose object.
    pub fn shard(&self) -> (String, String) {
        let mut full = self.to_hex();
        let rest = full.split_off(2);
        (full, rest)
    }

    /// `"xx/yyyy…"`, the loose object path relative to the objects directory.
    pub fn loose_path(&self) -> String {
        let (dir, file) = self.shard();
        format!("{dir}/{file}")
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_short_hex(8))
    }
}

impl FromStr for ObjectId {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
