use bstr::{BStr, BString};
use vcs_hash::ObjectId;
use vcs_utils::Signature;

use crate::{fields, ObjectError, ObjectType};

/// An annotated tag: a named, messaged pointer to another object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub target: ObjectId,
    pub target_type: ObjectType,
    pub name: BString,
    pub tagger: Option<Signature>,
    pub message: BString,
}

impl Tag {
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let block = fields::parse(content)?;
        let mut target = None;
        let mut target_type = None;
        let mut name = None;
        let mut tagger = None;

        for (key, value) in block.entries {
            match key {
                b"object" => {
                    let hex = std::str::from_utf8(&value)
                        .map_err(|_| ObjectError::InvalidHeader("non-ASCII object id".into()))?;
                    target = Some(ObjectId::from_hex(hex)?);
                }
                b"type" => target_type = Some(ObjectType::from_bytes(&value)?),
                b"tag" => name = Some(value),
                b"tagger" => {
                    tagger = Some(
                        Signature::parse(BStr::new(&value))
                            .map_err(|e| ObjectError::InvalidSignature(e.to_string()))?,
                    )
                }
                _ => {}
            }
        }

        let missing = |field| ObjectError::MissingField {
            object: "tag",
            field,
        };
        Ok(Self {
            target: target.ok_or_else(|| missing("object"))?,
            target_type: target_type.ok_or_else(|| missing("type"))?,
            name: name.ok_or_else(|| missing("tag"))?,
            tagger,
            message: BString::from(block.message),
        })
    }

    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.message.len());
        fields::write(&mut out, b"object", self.target.to_hex().as_bytes());
        fields::write(&mut out, b"type", self.target_type.as_bytes());
        fields::write(&mut out, b"tag", &self.name);
        if let Some(tagger) = &self.tagger {
            fields::write(&mut out, b"tagger", &tagger.to_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}
