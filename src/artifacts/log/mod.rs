//! Commit history traversal
//!
//! `rev_list` walks history newest first from a set of tips, honouring depth
//! and since limits, and reports which commits form shallow boundaries.

pub mod rev_list;
