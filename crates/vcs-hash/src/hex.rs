//! Lowercase hexadecimal encoding.

use crate::HashError;

const DIGITS: &[u8; 16] = b"0123456789abcdef";

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Encode bytes as lowercase hex.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// Decode `hex` into `out`, which must be exactly half its length.
pub fn decode_into(hex: &str, out: &mut [u8]) -> Result<(), HashError> {
    let src = hex.as_bytes();
    if src.len() != out.len() * 2 {
        return Err(HashError::InvalidHexLength {
            expected: out.len() * 2,
            actual: src.len(),
        });
    }
    for (i, pair) in src.chunks_exact(2).enumerate() {
        let hi = nibble(pair[0]).ok_or(HashError::InvalidHex {
            position: i * 2,
            character: pair[0] as char,
        })?;
        let lo = nibble(pair[1]).ok_or(HashError::InvalidHex {
            position: i * 2 + 1,
            character: pair[1] as char,
        })?;
        out[i] = (hi << 4) | lo;
    }
    Ok(())
}

/// Decode an even-length hex string.
pub fn decode(hex: &str) -> Result<Vec<u8>, HashError> {
    if hex.len() % 2 != 0 {
        return Err(HashError::InvalidHexLength {
            expected: hex.len() + 1,
            actual: hex.len(),
        });
    }
    let mut out = vec![0u8; hex.len() / 2];
    decode_into(hex, &mut out)?;
    Ok(out)
}

/// True when every character is a hex digit (any length).
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| nibble(b).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_known() {
        assert_eq!(encode(&[0x00, 0xab, 0xff, 0x10]), "00abff10");
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn decode_mixed_case() {
        assert_eq!(decode("00ABff10").unwrap(), vec![0x00, 0xab, 0xff, 0x10]);
    }

    #[test]
    fn decode_reports_position() {
        match decode("0g") {
            Err(HashError::InvalidHex { position, character }) => {
                assert_eq!(position, 1);
                assert_eq!(character, 'g');
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(decode("abc"), Err(HashError::InvalidHexLength { .. })));
    }

    #[test]
    fn hex_predicate() {
        assert!(is_hex("deadBEEF"));
        assert!(is_hex("abc"));
        assert!(!is_hex(""));
        assert!(!is_hex("xyz"));
    }
}
