use crate::areas::refs::HEAD_REF_NAME;
use crate::areas::repository::Repository;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use tracing::info;

/// Alias of `HEAD` accepted wherever a version is named
pub const LATEST_REF_NAME: &str = "latest";

impl Repository {
    /// Resolve `HEAD`, `latest`, an oid or a branch name to a commit
    ///
    /// Anything that does not lead to a stored commit is reported as
    /// `VaultReferenceInvalid`.
    pub async fn resolve_commit(&self, target: &str) -> Result<(ObjectId, Commit)> {
        let reference = if target == LATEST_REF_NAME {
            HEAD_REF_NAME
        } else {
            target
        };
        let invalid = || Error::VaultReferenceInvalid {
            reference: target.to_string(),
        };

        let oid = self
            .refs()
            .resolve(reference, self.config().max_ref_depth)
            .await?;

        match self.database().parse_object_as_commit(&oid).await {
            Ok(Some(commit)) => Ok((oid, commit)),
            Ok(None) | Err(Error::ObjectNotFound { .. }) => Err(invalid()),
            Err(err) => Err(err),
        }
    }

    /// Replace the working tree with `target`'s tree and move the current
    /// branch to it
    ///
    /// Commits after `target` stay in the object store but are no longer
    /// reachable from the branch.
    pub async fn checkout(&self, target: &str) -> Result<ObjectId> {
        let (oid, commit) = self.resolve_commit(target).await?;
        self.switch_to(&oid, &commit).await?;

        Ok(oid)
    }

    /// Reset the working tree to `commit`, then point the current branch at it
    ///
    /// HEAD moves only once the working tree is complete.
    pub async fn switch_to(&self, oid: &ObjectId, commit: &Commit) -> Result<()> {
        let files = self.commit_snapshot(commit).await?;

        self.workspace().reset(self.database(), &files).await?;
        self.refs()
            .update_head(oid, self.config().max_ref_depth)
            .await?;

        info!(oid = %oid, files = files.len(), "checked out version");
        Ok(())
    }

    /// Discard any working tree changes since the last commit
    pub async fn restore_head(&self) -> Result<()> {
        let files = self.head_snapshot().await?;
        self.workspace().reset(self.database(), &files).await
    }
}
