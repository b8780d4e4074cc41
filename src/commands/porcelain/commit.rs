use crate::areas::repository::Repository;
use crate::artifacts::diff::tree_diff::{TreeChangeType, describe_changes, diff_entries};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use crate::errors::Result;
use tracing::{debug, info};

impl Repository {
    /// Commit the working tree if it differs from HEAD
    ///
    /// The message lists each changed path as `added|modified|deleted: <path>`
    /// in path order. Returns `None` when nothing changed.
    pub async fn commit_working_tree(&self) -> Result<Option<ObjectId>> {
        let (head_oid, head_commit) = self.head_commit().await?;
        let head_snapshot = self.commit_snapshot(&head_commit).await?;
        let mut snapshot = self.workspace().snapshot().await?;

        let changes = diff_entries(&head_snapshot, &snapshot);
        if changes.is_empty() {
            debug!(head = %head_oid, "working tree unchanged, nothing to commit");
            return Ok(None);
        }

        for (path, change) in &changes {
            if let TreeChangeType::Added(_) | TreeChangeType::Modified { .. } = change {
                let entry = self.workspace().store_file(self.database(), path).await?;
                snapshot.insert(path.clone(), entry);
            }
        }

        let tree = Tree::build(snapshot.iter().map(|(path, entry)| (path.as_str(), entry)))?;
        let tree_oid = self.database().store_tree(&tree).await?;
        let commit_oid = self
            .write_commit(vec![head_oid], tree_oid, describe_changes(&changes))
            .await?;

        info!(oid = %commit_oid, changes = changes.len(), "committed working tree");
        Ok(Some(commit_oid))
    }
}
