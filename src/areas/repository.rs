use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::areas::storage::FileSystem;
use crate::areas::workspace::{CONTENTS_DIR, Workspace};
use crate::artifacts::diff::tree_diff::TreeEntryMap;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::config::Config;
use crate::errors::Result;
use std::sync::Arc;

pub const GIT_DIR: &str = ".git";

pub const OBJECTS_DIR: &str = ".git/objects";

/// One git repository: object store, refs and working tree over a shared root
#[derive(Debug, Clone)]
pub struct Repository {
    fs: Arc<dyn FileSystem>,
    config: Arc<Config>,
    database: Database,
    workspace: Workspace,
    refs: Refs,
}

impl Repository {
    pub fn new(fs: Arc<dyn FileSystem>, config: Arc<Config>) -> Self {
        Repository {
            database: Database::new(fs.clone(), OBJECTS_DIR),
            workspace: Workspace::new(fs.clone(), CONTENTS_DIR),
            refs: Refs::new(fs.clone(), GIT_DIR),
            fs,
            config,
        }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn author(&self) -> Author {
        Author::new(
            self.config.author_name.clone(),
            self.config.author_email.clone(),
        )
    }

    pub async fn head(&self) -> Result<ObjectId> {
        self.refs.resolve_head(self.config.max_ref_depth).await
    }

    pub async fn head_commit(&self) -> Result<(ObjectId, Commit)> {
        let oid = self.head().await?;
        let commit = self.database.load_commit(&oid).await?;

        Ok((oid, commit))
    }

    /// Flat file listing of a commit's tree
    pub async fn commit_snapshot(&self, commit: &Commit) -> Result<TreeEntryMap> {
        self.database
            .flatten_tree(commit.tree_oid(), self.config.max_tree_depth)
            .await
    }

    pub async fn head_snapshot(&self) -> Result<TreeEntryMap> {
        let (_, commit) = self.head_commit().await?;
        self.commit_snapshot(&commit).await
    }
}
