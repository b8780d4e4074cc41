use crate::areas::database::Database;
use crate::areas::storage::{DirEntry, FileSystem, join, list_files, normalize, parent};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeEntryMap;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object::hash_object;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Working tree directory inside a vault
pub const CONTENTS_DIR: &str = "contents";

/// The checked-out files of a repository
#[derive(Debug, Clone)]
pub struct Workspace {
    fs: Arc<dyn FileSystem>,
    path: String,
}

impl Workspace {
    pub fn new(fs: Arc<dyn FileSystem>, path: &str) -> Self {
        Workspace {
            fs,
            path: path.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Map a workspace-relative path to a storage path
    fn resolve(&self, path: &str) -> Result<String> {
        Ok(join(&self.path, &normalize(path)?))
    }

    pub async fn init(&self) -> Result<()> {
        self.fs.mkdir(&self.path, true).await
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.fs.exists(&self.resolve(path)?).await
    }

    pub async fn is_dir(&self, path: &str) -> Result<bool> {
        self.fs.is_dir(&self.resolve(path)?).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.fs.read(&self.resolve(path)?).await
    }

    /// Write a file, creating missing parent directories
    pub async fn write_file(&self, path: &str, data: Bytes) -> Result<()> {
        let path = self.resolve(path)?;
        if path == self.path {
            return Err(Error::Other(anyhow::anyhow!("cannot write the workspace root")));
        }
        self.fs.mkdir(parent(&path), true).await?;
        self.fs.write(&path, data).await
    }

    pub async fn remove_file(&self, path: &str) -> Result<()> {
        self.fs.unlink(&self.resolve(path)?).await
    }

    pub async fn remove_dir(&self, path: &str) -> Result<()> {
        self.fs.remove_dir_all(&self.resolve(path)?).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let to = self.resolve(to)?;
        self.fs.mkdir(parent(&to), true).await?;
        self.fs.rename(&self.resolve(from)?, &to).await
    }

    pub async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        self.fs.mkdir(&self.resolve(path)?, recursive).await
    }

    pub async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.fs.read_dir(&self.resolve(path)?).await
    }

    /// Every file, relative to the workspace root, sorted
    pub async fn list_files(&self) -> Result<Vec<String>> {
        list_files(self.fs.as_ref(), &self.path).await
    }

    /// Hash every file as a blob without storing anything
    pub async fn snapshot(&self) -> Result<TreeEntryMap> {
        let mut entries = TreeEntryMap::new();
        for file in self.list_files().await? {
            let content = self.read_file(&file).await?;
            let oid = hash_object(ObjectType::Blob, &content);
            entries.insert(file, DatabaseEntry::new(oid, EntryMode::default()));
        }

        Ok(entries)
    }

    /// Store the blob of one file
    pub async fn store_file(&self, database: &Database, path: &str) -> Result<DatabaseEntry> {
        let content = self.read_file(path).await?;
        let oid = database.store(&Blob::new(content)).await?;

        Ok(DatabaseEntry::new(oid, EntryMode::default()))
    }

    /// Replace the whole working tree with `files`
    pub async fn reset(&self, database: &Database, files: &TreeEntryMap) -> Result<()> {
        if self.fs.exists(&self.path).await? {
            self.fs.remove_dir_all(&self.path).await?;
        }
        self.fs.mkdir(&self.path, true).await?;

        for (path, entry) in files {
            let blob = database
                .parse_object_as_blob(&entry.oid)
                .await?
                .ok_or_else(|| Error::corrupt(&entry.oid, "expected a blob"))?;
            self.write_file(path, blob.into_content()).await?;
        }

        debug!(files = files.len(), "reset working tree");
        Ok(())
    }
}
