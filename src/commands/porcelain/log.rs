use crate::areas::refs::HEAD_REF_NAME;
use crate::areas::repository::Repository;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::Result;
use colored::Colorize;
use std::ops::Deref;
use tracing::warn;

/// One entry of a vault's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitLog {
    pub oid: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Author,
    pub committer: Author,
    pub message: String,
}

impl CommitLog {
    fn from_commit(oid: ObjectId, commit: Commit) -> Self {
        CommitLog {
            oid,
            parents: commit.parents().to_vec(),
            author: commit.author().clone(),
            committer: commit.committer().clone(),
            message: commit.message().to_string(),
        }
    }

    pub fn display_oneline(&self) -> String {
        format!(
            "{} {}",
            self.oid.to_short_oid().yellow(),
            self.message.lines().next().unwrap_or("")
        )
    }

    pub fn display_medium(&self) -> String {
        let mut lines = vec![
            format!("{}", format!("commit {}", self.oid).yellow()),
            format!("Author: {}", self.author.display_name()),
            format!("Date:   {}", self.author.readable_timestamp()),
            String::new(),
        ];
        lines.extend(self.message.lines().map(|line| format!("    {line}")));

        lines.join("\n")
    }
}

/// The commits a log walk reached, newest first
///
/// When an ancestor could not be read the walk stops there and `error`
/// names it; `entries` still holds everything listed before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitHistory {
    pub entries: Vec<CommitLog>,
    pub error: Option<(ObjectId, String)>,
}

impl CommitHistory {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

impl Deref for CommitHistory {
    type Target = [CommitLog];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl Repository {
    /// History reachable from `reference` (HEAD by default), newest first
    ///
    /// An unreadable ancestor ends the listing early instead of failing it.
    pub async fn log(&self, reference: Option<&str>, depth: Option<usize>) -> Result<CommitHistory> {
        let (tip, _) = self
            .resolve_commit(reference.unwrap_or(HEAD_REF_NAME))
            .await?;

        let history = RevList::new(self.database()).depth(depth).walk(&[tip]).await;
        if let Some((oid, reason)) = &history.error {
            warn!(oid = %oid, reason, "history truncated at unreadable commit");
        }

        Ok(CommitHistory {
            entries: history
                .commits
                .into_iter()
                .map(|(oid, commit)| CommitLog::from_commit(oid, commit))
                .collect(),
            error: history.error,
        })
    }
}
