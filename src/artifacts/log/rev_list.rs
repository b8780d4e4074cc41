use crate::areas::database::Database;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use tracing::warn;

/// Result of a history walk
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Emitted commits, newest committer timestamp first
    pub commits: Vec<(ObjectId, Commit)>,
    /// Commits whose history was cut off by a depth or since limit
    pub shallow: BTreeSet<ObjectId>,
    /// Previously shallow commits whose parents are now all included
    pub unshallow: BTreeSet<ObjectId>,
    /// First commit that could not be read, with the reason
    pub error: Option<(ObjectId, String)>,
}

impl History {
    pub fn oids(&self) -> impl Iterator<Item = &ObjectId> {
        self.commits.iter().map(|(oid, _)| oid)
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// Walks commit history newest first from one or more tips
///
/// The frontier is a max-heap keyed by `(committer timestamp, oid)`, so
/// commits sharing a timestamp come out in descending oid order.
#[derive(Debug, Clone)]
pub struct RevList<'r> {
    database: &'r Database,
    depth: Option<usize>,
    since: Option<i64>,
    shallow: BTreeSet<ObjectId>,
}

impl<'r> RevList<'r> {
    pub fn new(database: &'r Database) -> Self {
        RevList {
            database,
            depth: None,
            since: None,
            shallow: BTreeSet::new(),
        }
    }

    /// Emit at most `depth` commits
    pub fn depth(mut self, depth: Option<usize>) -> Self {
        self.depth = depth;
        self
    }

    /// Stop at the first commit made at or before `since` (unix seconds)
    pub fn since(mut self, since: Option<i64>) -> Self {
        self.since = since;
        self
    }

    /// Commits the other side already holds as shallow boundaries
    pub fn shallow(mut self, shallow: impl IntoIterator<Item = ObjectId>) -> Self {
        self.shallow = shallow.into_iter().collect();
        self
    }

    pub async fn walk(&self, tips: &[ObjectId]) -> History {
        let mut history = History::default();
        let mut frontier = BinaryHeap::new();
        let mut loaded = HashMap::new();
        let mut queued = HashSet::new();
        let mut cut_off = false;

        for tip in tips {
            if !queued.insert(tip.clone()) {
                continue;
            }
            if let Err(error) = self.enqueue(tip, &mut frontier, &mut loaded).await {
                history.error = Some((tip.clone(), error));
                return self.finish(history, false);
            }
        }

        while let Some((timestamp, oid)) = frontier.pop() {
            if self.since.is_some_and(|since| timestamp <= since) {
                cut_off = true;
                break;
            }

            let Some(commit) = loaded.remove(&oid) else {
                continue;
            };
            let parents = commit.parents().to_vec();
            history.commits.push((oid, commit));

            if self.depth.is_some_and(|depth| history.commits.len() >= depth) {
                cut_off = true;
                break;
            }

            for parent in parents {
                if !queued.insert(parent.clone()) {
                    continue;
                }
                if let Err(error) = self.enqueue(&parent, &mut frontier, &mut loaded).await {
                    warn!(oid = %parent, %error, "history walk stopped at unreadable commit");
                    history.error = Some((parent, error));
                    return self.finish(history, cut_off);
                }
            }
        }

        self.finish(history, cut_off)
    }

    async fn enqueue(
        &self,
        oid: &ObjectId,
        frontier: &mut BinaryHeap<(i64, ObjectId)>,
        loaded: &mut HashMap<ObjectId, Commit>,
    ) -> Result<(), String> {
        let commit = self
            .database
            .load_commit(oid)
            .await
            .map_err(|err| err.to_string())?;

        frontier.push((commit.timestamp().timestamp(), oid.clone()));
        loaded.insert(oid.clone(), commit);

        Ok(())
    }

    fn finish(&self, mut history: History, cut_off: bool) -> History {
        let emitted = history.oids().cloned().collect::<HashSet<_>>();

        for (oid, commit) in &history.commits {
            let complete = commit.parents().iter().all(|parent| emitted.contains(parent));
            if cut_off && !complete {
                history.shallow.insert(oid.clone());
            }
            if complete && self.shallow.contains(oid) {
                history.unshallow.insert(oid.clone());
            }
        }

        history
    }
}
