use crate::areas::repository::Repository;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;

impl Repository {
    /// Store a commit of `tree_oid` and advance the current branch to it
    pub async fn write_commit(
        &self,
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        message: String,
    ) -> Result<ObjectId> {
        let commit = Commit::new(parents, tree_oid, self.author(), message);
        let commit_id = self.database().store(&commit).await?;

        self.refs()
            .update_head(&commit_id, self.config().max_ref_depth)
            .await?;

        Ok(commit_id)
    }
}
