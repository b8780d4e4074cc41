//! Secret operations on a vault's working tree
//!
//! A [`WorkingTree`] is handed to write mutators and a [`SecretsView`] to
//! read accessors. Both address secrets by `/`-separated paths relative to
//! the vault's `contents/` directory.

use crate::areas::workspace::Workspace;
use crate::errors::{Error, Result};
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretStat {
    pub path: String,
    pub is_dir: bool,
    /// Content length, zero for directories
    pub size: usize,
}

/// Read-only access to the secrets of one snapshot
#[derive(Debug, Clone)]
pub struct SecretsView {
    workspace: Workspace,
}

impl SecretsView {
    pub(crate) fn new(workspace: Workspace) -> Self {
        SecretsView { workspace }
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.workspace.exists(path).await
    }

    pub async fn get_secret(&self, path: &str) -> Result<Bytes> {
        if !self.workspace.exists(path).await? || self.workspace.is_dir(path).await? {
            return Err(Error::SecretUndefined {
                path: path.to_string(),
            });
        }

        self.workspace.read_file(path).await
    }

    /// Every secret path, sorted
    pub async fn list_secrets(&self) -> Result<Vec<String>> {
        self.workspace.list_files().await
    }

    pub async fn stat_secret(&self, path: &str) -> Result<SecretStat> {
        if !self.workspace.exists(path).await? {
            return Err(Error::SecretUndefined {
                path: path.to_string(),
            });
        }

        let is_dir = self.workspace.is_dir(path).await?;
        let size = if is_dir {
            0
        } else {
            self.workspace.read_file(path).await?.len()
        };

        Ok(SecretStat {
            path: path.to_string(),
            is_dir,
            size,
        })
    }
}

/// Mutable access to the working tree during a vault write
#[derive(Debug, Clone)]
pub struct WorkingTree {
    workspace: Workspace,
}

impl WorkingTree {
    pub(crate) fn new(workspace: Workspace) -> Self {
        WorkingTree { workspace }
    }

    /// Read access to the tree as it currently stands, mutations included
    pub fn view(&self) -> SecretsView {
        SecretsView::new(self.workspace.clone())
    }

    /// Create a secret; fails with `SecretDefined` if the path is taken
    pub async fn add_secret(&self, path: &str, content: impl Into<Bytes>) -> Result<()> {
        if self.workspace.exists(path).await? {
            return Err(Error::SecretDefined {
                path: path.to_string(),
            });
        }

        self.workspace.write_file(path, content.into()).await
    }

    /// Replace an existing secret's content
    pub async fn update_secret(&self, path: &str, content: impl Into<Bytes>) -> Result<()> {
        self.require_secret(path).await?;
        self.workspace.write_file(path, content.into()).await
    }

    /// Create or replace a secret
    pub async fn write_secret(&self, path: &str, content: impl Into<Bytes>) -> Result<()> {
        if self.workspace.is_dir(path).await? {
            return Err(Error::SecretDefined {
                path: path.to_string(),
            });
        }

        self.workspace.write_file(path, content.into()).await
    }

    pub async fn rename_secret(&self, from: &str, to: &str) -> Result<()> {
        if !self.workspace.exists(from).await? {
            return Err(Error::SecretUndefined {
                path: from.to_string(),
            });
        }
        if self.workspace.exists(to).await? {
            return Err(Error::SecretDefined {
                path: to.to_string(),
            });
        }

        self.workspace.rename(from, to).await
    }

    /// Delete a secret, or a whole directory of them
    pub async fn delete_secret(&self, path: &str) -> Result<()> {
        if !self.workspace.exists(path).await? {
            return Err(Error::SecretUndefined {
                path: path.to_string(),
            });
        }

        if self.workspace.is_dir(path).await? {
            self.workspace.remove_dir(path).await
        } else {
            self.workspace.remove_file(path).await
        }
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        self.workspace.mkdir(path, true).await
    }

    async fn require_secret(&self, path: &str) -> Result<()> {
        if !self.workspace.exists(path).await? || self.workspace.is_dir(path).await? {
            return Err(Error::SecretUndefined {
                path: path.to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::storage::{FileSystem, MemoryFs};
    use crate::areas::workspace::CONTENTS_DIR;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn working_tree() -> WorkingTree {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFs::new());
        let workspace = Workspace::new(fs, CONTENTS_DIR);
        workspace.init().await.unwrap();
        WorkingTree::new(workspace)
    }

    #[tokio::test]
    async fn add_refuses_existing_paths() {
        let tree = working_tree().await;
        tree.add_secret("db/password", "hunter2").await.unwrap();

        let err = tree.add_secret("db/password", "other").await.unwrap_err();
        assert!(matches!(err, Error::SecretDefined { path } if path == "db/password"));

        let err = tree.add_secret("db", "other").await.unwrap_err();
        assert!(matches!(err, Error::SecretDefined { .. }));
    }

    #[tokio::test]
    async fn update_and_delete_require_an_existing_secret() {
        let tree = working_tree().await;

        assert!(matches!(
            tree.update_secret("missing", "x").await.unwrap_err(),
            Error::SecretUndefined { .. }
        ));
        assert!(matches!(
            tree.delete_secret("missing").await.unwrap_err(),
            Error::SecretUndefined { .. }
        ));

        tree.add_secret("token", "1").await.unwrap();
        tree.update_secret("token", "2").await.unwrap();
        assert_eq!(
            tree.view().get_secret("token").await.unwrap(),
            Bytes::from_static(b"2")
        );
    }

    #[tokio::test]
    async fn rename_moves_content_into_new_directories() {
        let tree = working_tree().await;
        tree.add_secret("token", "abc").await.unwrap();

        tree.rename_secret("token", "api/token").await.unwrap();

        let view = tree.view();
        assert_eq!(view.list_secrets().await.unwrap(), vec!["api/token".to_string()]);
        assert_eq!(
            view.stat_secret("api/token").await.unwrap(),
            SecretStat {
                path: "api/token".to_string(),
                is_dir: false,
                size: 3,
            }
        );
        assert!(view.stat_secret("api").await.unwrap().is_dir);
    }

    #[tokio::test]
    async fn deleting_a_directory_removes_its_secrets() {
        let tree = working_tree().await;
        tree.add_secret("aws/key", "k").await.unwrap();
        tree.add_secret("aws/secret", "s").await.unwrap();
        tree.add_secret("other", "o").await.unwrap();

        tree.delete_secret("aws").await.unwrap();

        assert_eq!(
            tree.view().list_secrets().await.unwrap(),
            vec!["other".to_string()]
        );
    }

    #[tokio::test]
    async fn directories_are_not_readable_as_secrets() {
        let tree = working_tree().await;
        tree.mkdir("empty/dir").await.unwrap();

        assert!(matches!(
            tree.view().get_secret("empty").await.unwrap_err(),
            Error::SecretUndefined { .. }
        ));
    }
}
