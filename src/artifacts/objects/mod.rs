//! Object types and operations
//!
//! All vault content is stored as objects identified by SHA-1 hashes:
//!
//! - **Blob**: secret content (raw bytes)
//! - **Tree**: directory listing (names, modes, and object IDs)
//! - **Commit**: snapshot with metadata (author, message, parent, tree)
//!
//! Objects are hashed over `<type> <size>\0<content>`, exactly as git does,
//! so ids and packfiles are interchangeable with any git implementation.

pub mod blob;
pub mod commit;
pub mod entry_mode;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of a raw SHA-1 digest
pub const OBJECT_ID_BYTES: usize = 20;
