//! Storage-backed components of a vault
//!
//! - `storage`: the filesystem collaborator and its in-memory, on-disk,
//!   scoped and encrypted implementations
//! - `database`: content-addressed object store
//! - `refs`: HEAD, branches and packed-refs
//! - `workspace`: the checked-out secrets
//! - `repository`: the three above over one root
//! - `vault`: a repository behind a lock and a lifecycle
//! - `vault_manager`: the registry of vaults

pub mod database;
pub mod refs;
pub mod repository;
pub mod storage;
pub mod vault;
pub mod vault_manager;
pub mod workspace;
