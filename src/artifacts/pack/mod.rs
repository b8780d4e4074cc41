//! Packfile encoding and decoding
//!
//! ## Format
//!
//! ```text
//! "PACK" | u32 version (2) | u32 object count      (big-endian)
//! per object: varint (type, size) header | zlib(canonical body)
//! 20-byte SHA-1 of everything above
//! ```
//!
//! No delta compression is produced, and delta entries are refused on read.

pub mod builder;
pub mod header;
pub mod reader;

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

pub const PACK_VERSION: u32 = 2;
