//! Porcelain commands
//!
//! - `init`: create the git directory and the initial empty commit
//! - `commit`: snapshot the working tree when it changed
//! - `checkout`: move the working tree and branch to another version
//! - `log`: list history newest first

pub mod checkout;
pub mod commit;
pub mod init;
pub mod log;
