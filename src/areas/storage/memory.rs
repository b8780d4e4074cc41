use crate::areas::storage::{DirEntry, FileSystem, normalize, parent};
use crate::errors::{Error, Result, not_found};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::ErrorKind;

#[derive(Debug, Clone)]
enum Node {
    File(Bytes),
    Dir,
}

/// In-memory filesystem
///
/// The root directory always exists. Nodes are keyed by normalized path, so a
/// subtree is a contiguous key range.
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<String, Node>>,
}

fn io_error(kind: ErrorKind, message: String) -> Error {
    Error::Io(std::io::Error::new(kind, message))
}

fn is_below(candidate: &str, dir: &str) -> bool {
    dir.is_empty() || candidate.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_is_dir(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
        path.is_empty() || matches!(nodes.get(path), Some(Node::Dir))
    }

    fn require_parent(nodes: &BTreeMap<String, Node>, path: &str) -> Result<()> {
        if Self::node_is_dir(nodes, parent(path)) {
            Ok(())
        } else {
            Err(not_found(parent(path)))
        }
    }
}

#[async_trait]
impl FileSystem for MemoryFs {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let path = normalize(path)?;
        match self.nodes.read().get(&path) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Dir) => Err(io_error(
                ErrorKind::IsADirectory,
                format!("{path} is a directory"),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();
        Self::require_parent(&nodes, &path)?;
        if Self::node_is_dir(&nodes, &path) {
            return Err(io_error(
                ErrorKind::IsADirectory,
                format!("{path} is a directory"),
            ));
        }
        nodes.insert(path, Node::File(data));

        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        Ok(path.is_empty() || self.nodes.read().contains_key(&path))
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        let path = normalize(path)?;
        Ok(Self::node_is_dir(&self.nodes.read(), &path))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> Result<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();

        if recursive {
            let mut current = String::new();
            for component in path.split('/').filter(|c| !c.is_empty()) {
                current = crate::areas::storage::join(&current, component);
                match nodes.get(&current) {
                    Some(Node::Dir) => {}
                    Some(Node::File(_)) => {
                        return Err(io_error(
                            ErrorKind::AlreadyExists,
                            format!("{current} is a file"),
                        ));
                    }
                    None => {
                        nodes.insert(current.clone(), Node::Dir);
                    }
                }
            }
            return Ok(());
        }

        if path.is_empty() || nodes.contains_key(&path) {
            return Err(io_error(
                ErrorKind::AlreadyExists,
                format!("{path} already exists"),
            ));
        }
        Self::require_parent(&nodes, &path)?;
        nodes.insert(path, Node::Dir);

        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&path) {
            Some(Node::File(_)) => {
                nodes.remove(&path);
                Ok(())
            }
            Some(Node::Dir) => Err(io_error(
                ErrorKind::IsADirectory,
                format!("{path} is a directory"),
            )),
            None => Err(not_found(path)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = normalize(from)?;
        let to = normalize(to)?;
        let mut nodes = self.nodes.write();

        let node = nodes.get(&from).cloned().ok_or_else(|| not_found(&from))?;
        Self::require_parent(&nodes, &to)?;
        if from == to {
            return Ok(());
        }
        if is_below(&to, &from) {
            return Err(io_error(
                ErrorKind::InvalidInput,
                format!("cannot move {from} into itself"),
            ));
        }

        match node {
            Node::File(data) => {
                if Self::node_is_dir(&nodes, &to) {
                    return Err(io_error(
                        ErrorKind::IsADirectory,
                        format!("{to} is a directory"),
                    ));
                }
                nodes.remove(&from);
                nodes.insert(to, Node::File(data));
            }
            Node::Dir => {
                if nodes.contains_key(&to) {
                    return Err(io_error(
                        ErrorKind::AlreadyExists,
                        format!("{to} already exists"),
                    ));
                }
                let moved = nodes
                    .iter()
                    .filter(|(key, _)| *key == &from || is_below(key, &from))
                    .map(|(key, node)| (key.clone(), node.clone()))
                    .collect::<Vec<_>>();
                for (key, node) in moved {
                    nodes.remove(&key);
                    nodes.insert(format!("{to}{}", &key[from.len()..]), node);
                }
            }
        }

        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = normalize(path)?;
        let nodes = self.nodes.read();
        if !Self::node_is_dir(&nodes, &path) {
            return Err(not_found(path));
        }

        Ok(nodes
            .iter()
            .filter(|(key, _)| is_below(key, &path) && parent(key) == path)
            .map(|(key, node)| DirEntry {
                name: key.rsplit('/').next().unwrap_or(key).to_string(),
                is_dir: matches!(node, Node::Dir),
            })
            .collect())
    }

    async fn remove_dir_all(&self, path: &str) -> Result<()> {
        let path = normalize(path)?;
        let mut nodes = self.nodes.write();
        if !path.is_empty() && !nodes.contains_key(&path) {
            return Err(not_found(path));
        }
        nodes.retain(|key, _| !(key == &path || is_below(key, &path)));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_requires_an_existing_parent() {
        let fs = MemoryFs::new();
        let err = fs.write("a/b", Bytes::from_static(b"x")).await.unwrap_err();
        assert!(err.is_not_found());

        fs.mkdir("a", false).await.unwrap();
        fs.write("a/b", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(fs.read("a/b").await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn renaming_a_directory_moves_its_subtree() {
        let fs = MemoryFs::new();
        fs.mkdir("a/b", true).await.unwrap();
        fs.write("a/b/c", Bytes::from_static(b"x")).await.unwrap();

        fs.rename("a", "z").await.unwrap();

        assert!(!fs.exists("a").await.unwrap());
        assert_eq!(fs.read("z/b/c").await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn read_dir_lists_only_direct_children() {
        let fs = MemoryFs::new();
        fs.mkdir("a/b", true).await.unwrap();
        fs.write("a/file", Bytes::new()).await.unwrap();
        fs.write("a/b/nested", Bytes::new()).await.unwrap();
        fs.write("ab", Bytes::new()).await.unwrap();

        let entries = fs.read_dir("a").await.unwrap();

        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "b".to_string(),
                    is_dir: true
                },
                DirEntry {
                    name: "file".to_string(),
                    is_dir: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn remove_dir_all_keeps_siblings_sharing_a_prefix() {
        let fs = MemoryFs::new();
        fs.mkdir("a", false).await.unwrap();
        fs.mkdir("ab", false).await.unwrap();
        fs.write("a/x", Bytes::new()).await.unwrap();

        fs.remove_dir_all("a").await.unwrap();

        assert!(!fs.exists("a/x").await.unwrap());
        assert!(fs.exists("ab").await.unwrap());
    }
}
