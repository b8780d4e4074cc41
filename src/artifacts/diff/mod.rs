//! Snapshot comparison
//!
//! `tree_diff` compares two flat `path -> entry` snapshots and names every
//! changed path. Commits generated by a vault write use the result as their
//! message.

pub mod tree_diff;
