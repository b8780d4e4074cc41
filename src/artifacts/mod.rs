//! Git data structures and algorithms
//!
//! - `database`: tree entry types shared with the object store
//! - `diff`: snapshot comparison
//! - `log`: commit history traversal
//! - `objects`: git object types (blob, tree, commit)
//! - `pack`: packfile encoding and decoding
//! - `protocol`: pkt-line framing, side-band multiplexing, capabilities

pub mod database;
pub mod diff;
pub mod log;
pub mod objects;
pub mod pack;
pub mod protocol;
