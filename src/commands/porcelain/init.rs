use crate::areas::refs::{HEAD_REF_NAME, HEADS_DIR};
use crate::areas::repository::{GIT_DIR, OBJECTS_DIR, Repository};
use crate::areas::storage::join;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::errors::Result;
use tracing::info;

pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

impl Repository {
    pub async fn is_initialized(&self) -> Result<bool> {
        self.fs().exists(&join(GIT_DIR, HEAD_REF_NAME)).await
    }

    /// Create the git directory and working tree, HEAD pointing at the
    /// default branch, without any commit
    pub async fn init_layout(&self) -> Result<()> {
        self.fs().mkdir(OBJECTS_DIR, true).await?;
        self.fs().mkdir(&join(GIT_DIR, HEADS_DIR), true).await?;
        self.refs()
            .set_symbolic(
                HEAD_REF_NAME,
                &join(HEADS_DIR, &self.config().default_branch),
            )
            .await?;
        self.workspace().init().await
    }

    /// Initialize the repository with an empty first commit, or return the
    /// current HEAD if it already exists
    pub async fn init(&self) -> Result<ObjectId> {
        if self.is_initialized().await? {
            return self.head().await;
        }

        self.init_layout().await?;

        let tree_oid = self.database().store_tree(&Tree::default()).await?;
        let commit_oid = self
            .write_commit(vec![], tree_oid, INITIAL_COMMIT_MESSAGE.to_string())
            .await?;

        info!(oid = %commit_oid, "initialized repository");
        Ok(commit_oid)
    }
}
