//! Byte storage the vaults are built on
//!
//! Every vault reads and writes through a [`FileSystem`] scoped to its own
//! root. Paths are virtual, `/`-separated and always relative to that root;
//! `..` components are refused so nothing can escape the scope.
//!
//! - `memory`: in-process tree, used by tests and ephemeral vaults
//! - `local`: a directory on disk
//! - `subdir`: scopes another filesystem under a prefix
//! - `encrypted`: encrypts file contents with a vault key

mod encrypted;
mod local;
mod memory;
mod subdir;

pub use encrypted::{EncryptedFs, VaultKey};
pub use local::LocalFs;
pub use memory::MemoryFs;
pub use subdir::SubdirFs;

use crate::errors::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

#[async_trait]
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Create or replace a file; the parent directory must exist
    async fn write(&self, path: &str, data: Bytes) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn is_dir(&self, path: &str) -> Result<bool>;

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()>;

    async fn unlink(&self, path: &str) -> Result<()>;

    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Direct children of a directory, sorted by name
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    async fn remove_dir_all(&self, path: &str) -> Result<()>;
}

/// Normalize a virtual path: strip `.`, empty components and leading `/`
pub fn normalize(path: &str) -> Result<String> {
    let mut components = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path {path} escapes its root"),
                )));
            }
            other => components.push(other),
        }
    }

    Ok(components.join("/"))
}

/// Join two virtual paths
pub fn join(base: &str, path: &str) -> String {
    match (base.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')),
    }
}

/// Parent of a normalized path (`""` is the root)
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// Collect every file below `dir`, as paths relative to `dir`, sorted
pub async fn list_files(fs: &dyn FileSystem, dir: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![String::new()];

    while let Some(relative) = pending.pop() {
        for entry in fs.read_dir(&join(dir, &relative)).await? {
            let child = join(&relative, &entry.name);
            if entry.is_dir {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }
    files.sort();

    Ok(files)
}
