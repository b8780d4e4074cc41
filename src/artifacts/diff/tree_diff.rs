use crate::artifacts::database::database_entry::DatabaseEntry;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    /// Word used for this change in generated commit messages
    pub fn label(&self) -> &'static str {
        match self {
            TreeChangeType::Added(_) => "added",
            TreeChangeType::Deleted(_) => "deleted",
            TreeChangeType::Modified { .. } => "modified",
        }
    }
}

/// Flat `path -> entry` view of a snapshot
pub type TreeEntryMap = BTreeMap<String, DatabaseEntry>;

/// Changed paths in lexicographic order
pub type ChangeSet = BTreeMap<String, TreeChangeType>;

/// Compare two flat snapshots
pub fn diff_entries(old: &TreeEntryMap, new: &TreeEntryMap) -> ChangeSet {
    let mut change_set = ChangeSet::new();

    for (path, old_entry) in old {
        if let Some(change) = TreeChangeType::from_entries(Some(old_entry.clone()), new.get(path).cloned()) {
            change_set.insert(path.clone(), change);
        }
    }
    for (path, new_entry) in new {
        if !old.contains_key(path) {
            change_set.insert(path.clone(), TreeChangeType::Added(new_entry.clone()));
        }
    }

    change_set
}

/// One `<label>: <path>` line per change, in path order
pub fn describe_changes(change_set: &ChangeSet) -> String {
    change_set
        .iter()
        .map(|(path, change)| format!("{}: {}", change.label(), path))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;

    fn entry(fill: char, mode: EntryMode) -> DatabaseEntry {
        let oid = ObjectId::try_parse(fill.to_string().repeat(40)).unwrap();
        DatabaseEntry::new(oid, mode)
    }

    #[test]
    fn changes_are_classified_and_ordered() {
        let regular = EntryMode::File(FileMode::Regular);
        let old = TreeEntryMap::from([
            ("b".to_string(), entry('1', regular)),
            ("c".to_string(), entry('2', regular)),
            ("keep".to_string(), entry('3', regular)),
        ]);
        let new = TreeEntryMap::from([
            ("a".to_string(), entry('4', regular)),
            ("c".to_string(), entry('5', regular)),
            ("keep".to_string(), entry('3', regular)),
        ]);

        let changes = diff_entries(&old, &new);

        assert_eq!(
            describe_changes(&changes),
            "added: a\ndeleted: b\nmodified: c"
        );
    }

    #[test]
    fn mode_changes_count_as_modifications() {
        let old = TreeEntryMap::from([("x".to_string(), entry('1', EntryMode::File(FileMode::Regular)))]);
        let new = TreeEntryMap::from([("x".to_string(), entry('1', EntryMode::File(FileMode::Executable)))]);

        let changes = diff_entries(&old, &new);
        assert!(matches!(changes["x"], TreeChangeType::Modified { .. }));
    }

    #[test]
    fn identical_snapshots_have_no_changes() {
        let same = TreeEntryMap::from([("x".to_string(), entry('1', EntryMode::default()))]);
        assert!(diff_entries(&same, &same).is_empty());
    }
}
