//! Git smart-HTTP transport
//!
//! The server answers ref discovery and `git-upload-pack` for the vaults of
//! a [`VaultManager`](crate::areas::vault_manager::VaultManager). The client
//! speaks the same protocol through any [`GitTransport`](client::GitTransport);
//! [`LocalTransport`](local::LocalTransport) connects the two in-process.

pub mod advertisement;
pub mod client;
pub mod local;
pub mod request;
pub mod server;
pub mod upload_pack;
