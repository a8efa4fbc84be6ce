//! Content digests and compression.
//!
//! Every stored object is addressed by the digest of its canonical
//! `"<type> <size>\0" + payload` form and persisted zlib-compressed. This
//! crate owns both halves: [`ObjectId`]/[`Hasher`] for identity and
//! [`zlib`] for the reversible byte transform.

mod algorithm;
mod error;
pub mod hasher;
pub mod hex;
mod oid;
pub mod zlib;

pub use algorithm::HashAlgorithm;
pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;
