//! Tree object
//!
//! Trees are directory snapshots: entry name to `(mode, oid)`, where the mode
//! says whether the child is a blob or another tree.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! Entries are kept in git order, which compares raw name bytes with
//! directories treated as if their name ended in `/`. Identical directory
//! contents therefore always serialize (and hash) identically.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::entry_mode::EntryMode;
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, PartialEq)]
enum TreeEntry {
    /// Entry whose object id is already known
    Stored(DatabaseEntry),
    /// Subtree built in memory whose id is derived from its contents
    Directory(Tree),
}

impl TreeEntry {
    fn mode(&self) -> EntryMode {
        match self {
            TreeEntry::Stored(entry) => entry.mode,
            TreeEntry::Directory(_) => EntryMode::Directory,
        }
    }

    fn oid(&self) -> anyhow::Result<ObjectId> {
        match self {
            TreeEntry::Stored(entry) => Ok(entry.oid.clone()),
            TreeEntry::Directory(tree) => tree.object_id(),
        }
    }

    fn to_database_entry(&self) -> anyhow::Result<DatabaseEntry> {
        Ok(DatabaseEntry::new(self.oid()?, self.mode()))
    }
}

/// Directory snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    /// Keyed by git sort key: directory names carry a trailing `/`
    entries: BTreeMap<String, TreeEntry>,
}

fn sort_key(name: &str, mode: EntryMode) -> String {
    if mode.is_tree() {
        format!("{name}/")
    } else {
        name.to_string()
    }
}

impl Tree {
    /// Build a tree hierarchy from a flat `path -> entry` listing
    ///
    /// Paths use `/` as separator; intermediate directories are created as
    /// needed.
    pub fn build<'a>(
        files: impl IntoIterator<Item = (&'a str, &'a DatabaseEntry)>,
    ) -> anyhow::Result<Self> {
        let mut root = Self::default();

        for (path, entry) in files {
            let components = path
                .split('/')
                .filter(|component| !component.is_empty())
                .collect::<Vec<_>>();
            if components.is_empty() {
                anyhow::bail!("Invalid empty path in tree");
            }
            root.add_entry(&components, entry)?;
        }

        Ok(root)
    }

    fn add_entry(&mut self, components: &[&str], entry: &DatabaseEntry) -> anyhow::Result<()> {
        match components {
            [name] => {
                if self.entries.contains_key(&sort_key(name, EntryMode::Directory)) {
                    anyhow::bail!("{name} is both a file and a directory");
                }
                self.entries.insert(
                    sort_key(name, entry.mode),
                    TreeEntry::Stored(entry.clone()),
                );
            }
            [parent, rest @ ..] => {
                if self.entries.contains_key(*parent) {
                    anyhow::bail!("{parent} is both a file and a directory");
                }
                let child = self
                    .entries
                    .entry(sort_key(parent, EntryMode::Directory))
                    .or_insert_with(|| TreeEntry::Directory(Tree::default()));
                match child {
                    TreeEntry::Directory(tree) => tree.add_entry(rest, entry)?,
                    TreeEntry::Stored(_) => anyhow::bail!("{parent} is already stored"),
                }
            }
            [] => unreachable!("paths are checked to be non-empty"),
        }

        Ok(())
    }

    /// Trees in post-order (children before parents)
    ///
    /// Child ids must exist before a parent referencing them is stored.
    pub fn traverse(&self) -> Vec<&Tree> {
        let mut trees = Vec::new();
        for entry in self.entries.values() {
            if let TreeEntry::Directory(tree) = entry {
                trees.extend(tree.traverse());
            }
        }
        trees.push(self);

        trees
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries as `(name, entry)` in serialization order
    pub fn entries(&self) -> impl Iterator<Item = anyhow::Result<(&str, DatabaseEntry)>> {
        self.entries.iter().map(|(key, entry)| {
            Ok((key.trim_end_matches('/'), entry.to_database_entry()?))
        })
    }

    pub fn get(&self, name: &str) -> Option<DatabaseEntry> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(&format!("{name}/")))
            .and_then(|entry| entry.to_database_entry().ok())
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();

        for (key, tree_entry) in &self.entries {
            let name = key.trim_end_matches('/');
            let header = format!("{:o} {}", tree_entry.mode().as_u32(), name);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            tree_entry.oid()?.write_h40_to(&mut content_bytes)?;
        }

        Ok(Bytes::from(content_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            // Read "mode " (space-delimited)
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(anyhow::anyhow!("unexpected EOF in mode"));
            }

            let mode = EntryMode::from_octal_str(std::str::from_utf8(&mode_bytes)?)?;

            // Read "name\0"
            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                return Err(anyhow::anyhow!("unexpected EOF in name"));
            }
            let name = std::str::from_utf8(&name_bytes)?;
            if name.is_empty() || name.contains('/') || name == "." || name == ".." {
                return Err(anyhow::anyhow!("invalid tree entry name {name:?}"));
            }

            let oid =
                ObjectId::read_h40_from(&mut reader).context("unexpected EOF in object id")?;

            let previous = entries.insert(
                sort_key(name, mode),
                TreeEntry::Stored(DatabaseEntry::new(oid, mode)),
            );
            if previous.is_some() {
                return Err(anyhow::anyhow!("duplicate tree entry {name}"));
            }
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries
            .iter()
            .map(|(key, tree_entry)| {
                format!(
                    "{:0>6} {} {}\t{}",
                    tree_entry.mode().as_str(),
                    tree_entry.mode().object_type(),
                    tree_entry.oid().unwrap_or_default(),
                    key.trim_end_matches('/')
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::entry_mode::FileMode;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn file_entry(content: &'static [u8]) -> DatabaseEntry {
        let oid = Blob::new(Bytes::from_static(content)).object_id().unwrap();
        DatabaseEntry::new(oid, EntryMode::File(FileMode::Regular))
    }

    #[test]
    fn empty_tree_hash_matches_git() {
        assert_eq!(
            Tree::default().object_id().unwrap().as_ref(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn insertion_order_does_not_change_the_hash() {
        let a = file_entry(b"1");
        let b = file_entry(b"2");
        let c = file_entry(b"3");

        let first = Tree::build([("a", &a), ("dir/b", &b), ("dir/c", &c)]).unwrap();
        let second = Tree::build([("dir/c", &c), ("a", &a), ("dir/b", &b)]).unwrap();

        assert_eq!(first.object_id().unwrap(), second.object_id().unwrap());
    }

    #[test]
    fn directories_sort_as_if_suffixed_with_slash() {
        let file = file_entry(b"x");
        // "a.txt" < "a/" because '.' (0x2e) < '/' (0x2f)
        let tree = Tree::build([("a/inner", &file), ("a.txt", &file), ("a-b", &file)]).unwrap();

        let names = tree
            .entries()
            .map(|entry| entry.map(|(name, _)| name.to_string()))
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(names, vec!["a-b", "a.txt", "a"]);
    }

    #[test]
    fn serialized_tree_parses_back() {
        let file = file_entry(b"content");
        let tree = Tree::build([("x/y/z", &file), ("top", &file)]).unwrap();
        let bytes = tree.serialize().unwrap();

        let parsed = Tree::deserialize(Cursor::new(bytes)).unwrap();

        assert_eq!(parsed.object_id().unwrap(), tree.object_id().unwrap());
        assert!(parsed.get("x").unwrap().is_tree());
        assert_eq!(parsed.get("top").unwrap(), file);
    }

    #[test]
    fn post_order_lists_children_first() {
        let file = file_entry(b"content");
        let tree = Tree::build([("x/y/z", &file)]).unwrap();

        let order = tree.traverse();
        assert_eq!(order.len(), 3);
        assert!(std::ptr::eq(*order.last().unwrap(), &tree));
    }

    #[test]
    fn file_and_directory_with_same_name_is_rejected() {
        let file = file_entry(b"content");
        assert!(Tree::build([("x", &file), ("x/y", &file)]).is_err());
    }
}
