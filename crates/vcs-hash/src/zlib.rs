//! zlib compression of stored objects.
//!
//! Decompression is strict: the stream must end exactly at the end of the
//! input, and any error, truncation or trailing data is reported as
//! [`HashError::Decompress`] instead of returning partial output.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Decompress, FlushDecompress, Status};

pub use flate2::Compression;

use crate::HashError;

/// Translate a `core.compression` value (-1 for default, 0..=9) into a level.
pub fn level(value: i64) -> Compression {
    match value {
        0..=9 => Compression::new(value as u32),
        _ => Compression::default(),
    }
}

/// Compress the concatenation of `parts`.
pub fn compress_parts(parts: &[&[u8]], level: Compression) -> Result<Vec<u8>, HashError> {
    let total: usize = parts.iter().map(|p| p.len()).sum();
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(total / 2 + 16), level);
    for part in parts {
        encoder.write_all(part)?;
    }
    Ok(encoder.finish()?)
}

pub fn compress(data: &[u8], level: Compression) -> Result<Vec<u8>, HashError> {
    compress_parts(&[data], level)
}

/// Inflate a complete zlib stream.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, HashError> {
    let hint = input.len().saturating_mul(3).max(64);
    inflate(input, usize::MAX - 1, hint)
}

/// Inflate a complete zlib stream whose output must not exceed `limit`
/// bytes. The output buffer is reserved up front, so an absurd `limit`
/// surfaces as [`HashError::OutOfMemory`].
pub fn decompress_with_limit(input: &[u8], limit: usize) -> Result<Vec<u8>, HashError> {
    inflate(input, limit, limit.saturating_add(1))
}

/// Inflate only the first `len` bytes (or fewer if the stream is shorter).
/// Used to read an object header without inflating the payload.
pub fn decompress_prefix(input: &[u8], len: usize) -> Result<Vec<u8>, HashError> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let consumed = inflater.total_in() as usize;
        let produced = out.len();
        let status = inflater
            .decompress_vec(&input[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| HashError::Decompress {
                reason: e.to_string(),
            })?;
        if status == Status::StreamEnd {
            break;
        }
        if inflater.total_in() as usize == consumed && out.len() == produced {
            return Err(HashError::Decompress {
                reason: "stream ended prematurely".into(),
            });
        }
    }
    Ok(out)
}

fn reserve(out: &mut Vec<u8>, additional: usize) -> Result<(), HashError> {
    out.try_reserve_exact(additional)
        .map_err(|_| HashError::OutOfMemory { size: additional })
}

fn inflate(input: &[u8], limit: usize, initial: usize) -> Result<Vec<u8>, HashError> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::new();
    reserve(&mut out, initial.min(limit.saturating_add(1)))?;

    loop {
        if out.len() == out.capacity() {
            if out.len() > limit {
                return Err(HashError::TooLarge { limit });
            }
            let grow = out
                .capacity()
                .max(64)
                .min(limit.saturating_add(1) - out.len());
            reserve(&mut out, grow)?;
        }

        let consumed = inflater.total_in() as usize;
        let produced = out.len();
        let status = inflater
            .decompress_vec(&input[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| HashError::Decompress {
                reason: e.to_string(),
            })?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let stalled = inflater.total_in() as usize == consumed && out.len() == produced;
                if stalled && out.len() < out.capacity() {
                    return Err(HashError::Decompress {
                        reason: "stream ended prematurely".into(),
                    });
                }
            }
        }
    }

    if out.len() > limit {
        return Err(HashError::TooLarge { limit });
    }
    if (inflater.total_in() as usize) != input.len() {
        return Err(HashError::Decompress {
            reason: format!(
                "{} bytes of trailing data",
                input.len() - inflater.total_in() as usize
            ),
        });
    }
    Ok(out)
}
