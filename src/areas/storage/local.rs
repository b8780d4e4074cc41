use crate::areas::storage::{DirEntry, FileSystem, normalize};
use crate::errors::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Filesystem rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        LocalFs {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Ok(self.root.clone());
        }

        Ok(path
            .split('/')
            .fold(self.root.clone(), |acc, component| acc.join(component)))
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    async fn read(&self, path: &str) -> Result<Bytes> {
        Ok(tokio::fs::read(self.resolve(path)?).await?.into())
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        Ok(tokio::fs::write(self.resolve(path)?, data).await?)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)?).await?)
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        match tokio::fs::metadata(self.resolve(path)?).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let path = self.resolve(path)?;
        if recursive {
            tokio::fs::create_dir_all(path).await?;
        } else {
            tokio::fs::create_dir(path).await?;
        }

        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        Ok(tokio::fs::remove_file(self.resolve(path)?).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        Ok(tokio::fs::rename(self.resolve(from)?, self.resolve(to)?).await?)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(self.resolve(path)?).await?;

        while let Some(entry) = dir.next_entry().await? {
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type().await?.is_dir(),
            });
        }
        entries.sort();

        Ok(entries)
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        Ok(tokio::fs::remove_dir_all(self.resolve(path)?).await?)
    }
}
