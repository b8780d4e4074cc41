use crate::areas::storage::{DirEntry, FileSystem, join, normalize};
use crate::errors::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// View of another filesystem rooted at `prefix`
#[derive(Debug, Clone)]
pub struct SubdirFs {
    inner: Arc<dyn FileSystem>,
    prefix: String,
}

impl SubdirFs {
    pub fn new(inner: Arc<dyn FileSystem>, prefix: &str) -> Result<Self> {
        Ok(SubdirFs {
            inner,
            prefix: normalize(prefix)?,
        })
    }

    fn scoped(&self, path: &str) -> Result<String> {
        Ok(join(&self.prefix, &normalize(path)?))
    }
}

#[async_trait]
impl FileSystem for SubdirFs {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.inner.read(&self.scoped(path)?).await
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        self.inner.write(&self.scoped(path)?, data).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(&self.scoped(path)?).await
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        self.inner.is_dir(&self.scoped(path)?).await
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        self.inner.mkdir(&self.scoped(path)?, recursive).await
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        self.inner.unlink(&self.scoped(path)?).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.inner
            .rename(&self.scoped(from)?, &self.scoped(to)?)
            .await
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.read_dir(&self.scoped(path)?).await
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        self.inner.remove_dir_all(&self.scoped(path)?).await
    }
}
