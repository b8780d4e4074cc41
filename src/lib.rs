//! Encrypted, versioned secret vaults on a git-compatible object store
//!
//! Every vault is a git repository: secrets are blobs in its working tree,
//! each write is a commit, and vaults can be cloned or pulled between peers
//! over git's smart-HTTP `upload-pack` protocol.
//!
//! - `areas`: storage, object database, refs, working tree, vaults
//! - `artifacts`: objects, tree diffs, history walks, packfiles, wire codecs
//! - `commands`: repository operations and the secret handles
//! - `transport`: smart-HTTP server and client

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod config;
pub mod errors;
pub mod transport;
