//! Vault command implementations
//!
//! Commands are `impl Repository` blocks split the way git splits its own:
//!
//! - `plumbing`: direct object manipulation (writing commits)
//! - `porcelain`: version control workflows (init, commit, checkout, log)
//! - `secrets`: the handles mutators and accessors use on a working tree

pub mod plumbing;
pub mod porcelain;
pub mod secrets;
