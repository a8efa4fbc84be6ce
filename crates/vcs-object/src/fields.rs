//! `key value` header blocks shared by commits and tags.
//!
//! A block is a run of lines terminated by an empty line; everything after
//! it is the message. A line starting with a space continues the value of
//! the previous field (used by multi-line signatures).

use bstr::{BString, ByteSlice};

use crate::ObjectError;

pub(crate) struct Fields<'a> {
    pub entries: Vec<(&'a [u8], BString)>,
    pub message: &'a [u8],
}

pub(crate) fn parse(data: &[u8]) -> Result<Fields<'_>, ObjectError> {
    let mut entries: Vec<(&[u8], BString)> = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let end = data[pos..]
            .find_byte(b'\n')
            .map_or(data.len(), |p| pos + p);
        let line = &data[pos..end];
        pos = (end + 1).min(data.len());

        if line.is_empty() {
            return Ok(Fields {
                entries,
                message: &data[pos..],
            });
        }

        if let Some(rest) = line.strip_prefix(b" ") {
            let (_, value) = entries.last_mut().ok_or_else(|| {
                ObjectError::InvalidHeader("continuation line without a field".into())
            })?;
            value.push(b'\n');
            value.extend_from_slice(rest);
            continue;
        }

        let (key, value) = line
            .split_once_str(" ")
            .ok_or_else(|| ObjectError::InvalidHeader(format!("malformed line '{}'", line.as_bstr())))?;
        entries.push((key, BString::from(value)));
    }

    Ok(Fields {
        entries,
        message: &data[data.len()..],
    })
}

/// Append `key value\n`, indenting continuation lines of a multi-line value.
pub(crate) fn write(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    out.extend_from_slice(key);
    out.push(b' ');
    for (i, line) in value.split_str("\n").enumerate() {
        if i > 0 {
            out.extend_from_slice(b"\n ");
        }
        out.extend_from_slice(line);
    }
    out.push(b'\n');
}
