//! The `"<type> <size>\0"` prefix of a stored object.

use bstr::ByteSlice;

use crate::{ObjectError, ObjectType};

/// Longest header we accept: `"commit "` plus 20 size digits plus NUL.
pub const MAX_HEADER_LEN: usize = 32;

/// Parse a header, returning `(type, payload size, header length)`.
/// The header length includes the NUL terminator.
pub fn parse(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let window = &data[..data.len().min(MAX_HEADER_LEN)];
    let nul = window
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::InvalidHeader("missing NUL terminator".into()))?;
    let (kind, size) = window[..nul]
        .split_once_str(" ")
        .ok_or_else(|| ObjectError::InvalidHeader("missing space".into()))?;

    let kind = ObjectType::from_bytes(kind)?;
    if size.is_empty() || !size.iter().all(u8::is_ascii_digit) || (size.len() > 1 && size[0] == b'0')
    {
        return Err(ObjectError::InvalidHeader(format!(
            "invalid size '{}'",
            String::from_utf8_lossy(size)
        )));
    }
    let size = std::str::from_utf8(size)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ObjectError::InvalidHeader("size out of range".into()))?;

    Ok((kind, size, nul + 1))
}

/// Encode a header.
pub fn encode(kind: ObjectType, size: usize) -> Vec<u8> {
    format!("{kind} {size}\0").into_bytes()
}
