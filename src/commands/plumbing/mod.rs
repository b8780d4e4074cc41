//! Plumbing commands
//!
//! - `write-commit`: store a commit object and advance the current branch

mod write_commit;
