use crate::areas::storage::{FileSystem, join, parent};
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable, hash_object};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{Error, Result};
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tracing::debug;

/// An object's kind and canonical body, header stripped
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub object_type: ObjectType,
    pub payload: Bytes,
}

/// Content-addressed loose object store
#[derive(Debug, Clone)]
pub struct Database {
    fs: Arc<dyn FileSystem>,
    path: String,
}

impl Database {
    pub fn new(fs: Arc<dyn FileSystem>, path: &str) -> Self {
        Database {
            fs,
            path: path.to_string(),
        }
    }

    fn object_path(&self, object_id: &ObjectId) -> String {
        join(&self.path, &object_id.to_path())
    }

    pub async fn exists(&self, object_id: &ObjectId) -> Result<bool> {
        self.fs.exists(&self.object_path(object_id)).await
    }

    pub async fn store(&self, object: &impl Object) -> Result<ObjectId> {
        let payload = object.serialize()?;
        self.write_object(object.object_type(), payload).await
    }

    /// Store every tree of a hierarchy, children first, returning the root id
    pub async fn store_tree(&self, tree: &Tree) -> Result<ObjectId> {
        let mut root = None;
        for subtree in tree.traverse() {
            root = Some(self.store(subtree).await?);
        }

        // traverse always yields at least the root itself
        match root {
            Some(oid) => Ok(oid),
            None => self.store(tree).await,
        }
    }

    /// Write an object unless it is already present
    pub async fn write_object(&self, object_type: ObjectType, payload: Bytes) -> Result<ObjectId> {
        let object_id = hash_object(object_type, &payload);
        let object_path = self.object_path(&object_id);

        if self.fs.exists(&object_path).await? {
            return Ok(object_id);
        }

        let object_dir = parent(&object_path);
        self.fs.mkdir(object_dir, true).await?;

        let mut content = Vec::with_capacity(payload.len() + 32);
        content.extend_from_slice(object_type.header(payload.len()).as_bytes());
        content.extend_from_slice(&payload);
        let content = Self::compress(&content)?;

        // rename the temp file to the object file to make it atomic
        let temp_object_path = join(object_dir, &Self::generate_temp_name());
        self.fs.write(&temp_object_path, content).await?;
        self.fs.rename(&temp_object_path, &object_path).await?;

        debug!(oid = %object_id, kind = %object_type, "stored object");
        Ok(object_id)
    }

    pub async fn read_object(&self, object_id: &ObjectId) -> Result<RawObject> {
        let compressed = match self.fs.read(&self.object_path(object_id)).await {
            Ok(compressed) => compressed,
            Err(err) if err.is_not_found() => {
                return Err(Error::ObjectNotFound {
                    oid: object_id.clone(),
                });
            }
            Err(err) => return Err(err),
        };

        let content = Self::decompress(&compressed).map_err(|err| Error::corrupt(object_id, err))?;
        let mut reader = Cursor::new(content);
        let (object_type, size) = ObjectType::parse_object_header(&mut reader)
            .map_err(|err| Error::corrupt(object_id, err))?;

        let offset = reader.position() as usize;
        let content = reader.into_inner();
        if content.len() - offset != size {
            return Err(Error::corrupt(
                object_id,
                format!("declared size {size}, found {}", content.len() - offset),
            ));
        }

        Ok(RawObject {
            object_type,
            payload: content.slice(offset..),
        })
    }

    pub async fn parse_object(&self, object_id: &ObjectId) -> Result<ObjectBox> {
        let raw = self.read_object(object_id).await?;
        let reader = Cursor::new(raw.payload);

        let parsed = match raw.object_type {
            ObjectType::Blob => Blob::deserialize(reader).map(|blob| ObjectBox::Blob(Box::new(blob))),
            ObjectType::Tree => Tree::deserialize(reader).map(|tree| ObjectBox::Tree(Box::new(tree))),
            ObjectType::Commit => {
                Commit::deserialize(reader).map(|commit| ObjectBox::Commit(Box::new(commit)))
            }
        };

        parsed.map_err(|err| Error::corrupt(object_id, err))
    }

    pub async fn parse_object_as_blob(&self, object_id: &ObjectId) -> Result<Option<Blob>> {
        match self.parse_object(object_id).await? {
            ObjectBox::Blob(blob) => Ok(Some(*blob)),
            _ => Ok(None),
        }
    }

    pub async fn parse_object_as_tree(&self, object_id: &ObjectId) -> Result<Option<Tree>> {
        match self.parse_object(object_id).await? {
            ObjectBox::Tree(tree) => Ok(Some(*tree)),
            _ => Ok(None),
        }
    }

    pub async fn parse_object_as_commit(&self, object_id: &ObjectId) -> Result<Option<Commit>> {
        match self.parse_object(object_id).await? {
            ObjectBox::Commit(commit) => Ok(Some(*commit)),
            _ => Ok(None),
        }
    }

    /// Load a commit, treating any other kind as corruption
    pub async fn load_commit(&self, object_id: &ObjectId) -> Result<Commit> {
        self.parse_object_as_commit(object_id)
            .await?
            .ok_or_else(|| Error::corrupt(object_id, "expected a commit"))
    }

    /// Every file reachable from a tree, keyed by its `/`-separated path
    pub async fn flatten_tree(
        &self,
        tree_oid: &ObjectId,
        max_depth: usize,
    ) -> Result<BTreeMap<String, DatabaseEntry>> {
        let mut files = BTreeMap::new();
        let mut pending = vec![(String::new(), tree_oid.clone(), 0)];

        while let Some((prefix, oid, depth)) = pending.pop() {
            if depth > max_depth {
                return Err(Error::corrupt(&oid, "tree nesting is too deep"));
            }
            let tree = self
                .parse_object_as_tree(&oid)
                .await?
                .ok_or_else(|| Error::corrupt(&oid, "expected a tree"))?;

            for entry in tree.entries() {
                let (name, entry) = entry.map_err(|err| Error::corrupt(&oid, err))?;
                let path = join(&prefix, name);
                if entry.is_tree() {
                    pending.push((path, entry.oid, depth + 1));
                } else {
                    files.insert(path, entry);
                }
            }
        }

        Ok(files)
    }

    fn compress(data: &[u8]) -> Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(data)
            .context("Unable to compress object content")?;

        Ok(encoder
            .finish()
            .context("Unable to finish compressing object content")?
            .into())
    }

    fn decompress(data: &[u8]) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .context("Unable to decompress object content")?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", uuid::Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::storage::MemoryFs;
    use crate::artifacts::objects::commit::Author;
    use crate::artifacts::objects::entry_mode::EntryMode;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> Database {
        Database::new(Arc::new(MemoryFs::new()), "objects")
    }

    #[rstest]
    #[tokio::test]
    async fn stored_objects_read_back_identically(database: Database) {
        let blob = Blob::new(Bytes::from_static(b"hello world"));
        let oid = database.store(&blob).await.unwrap();

        assert_eq!(oid.as_ref(), "95d09f2b10159347eece71399a7e2e907ea3df4f");
        let raw = database.read_object(&oid).await.unwrap();
        assert_eq!(raw.object_type, ObjectType::Blob);
        assert_eq!(raw.payload, Bytes::from_static(b"hello world"));
    }

    #[rstest]
    #[tokio::test]
    async fn storing_twice_is_idempotent(database: Database) {
        let payload = Bytes::from_static(b"same");
        let first = database
            .write_object(ObjectType::Blob, payload.clone())
            .await
            .unwrap();
        let second = database
            .write_object(ObjectType::Blob, payload)
            .await
            .unwrap();

        assert_eq!(first, second);
        let shard = database.fs.read_dir(parent(&database.object_path(&first))).await.unwrap();
        assert_eq!(shard.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_object_is_not_found(database: Database) {
        let err = database.read_object(&ObjectId::zero()).await.unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn garbage_is_reported_as_corrupt(database: Database) {
        let oid = ObjectId::try_parse("1".repeat(40)).unwrap();
        let path = database.object_path(&oid);
        database.fs.mkdir(parent(&path), true).await.unwrap();
        database
            .fs
            .write(&path, Bytes::from_static(b"not zlib"))
            .await
            .unwrap();

        let err = database.read_object(&oid).await.unwrap_err();
        assert!(matches!(err, Error::ObjectCorrupt { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn size_mismatch_is_reported_as_corrupt(database: Database) {
        let oid = ObjectId::try_parse("2".repeat(40)).unwrap();
        let path = database.object_path(&oid);
        database.fs.mkdir(parent(&path), true).await.unwrap();
        let content = Database::compress(b"blob 10\0short").unwrap();
        database.fs.write(&path, content).await.unwrap();

        let err = database.read_object(&oid).await.unwrap_err();
        assert!(matches!(err, Error::ObjectCorrupt { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn nested_trees_flatten_to_paths(database: Database) {
        let a = database.store(&Blob::new(Bytes::from_static(b"a"))).await.unwrap();
        let b = database.store(&Blob::new(Bytes::from_static(b"b"))).await.unwrap();
        let a = DatabaseEntry::new(a, EntryMode::default());
        let b = DatabaseEntry::new(b, EntryMode::default());

        let tree = Tree::build([("top", &a), ("dir/sub/deep", &b)]).unwrap();
        let tree_oid = database.store_tree(&tree).await.unwrap();

        let files = database.flatten_tree(&tree_oid, 256).await.unwrap();
        assert_eq!(
            files.keys().collect::<Vec<_>>(),
            vec!["dir/sub/deep", "top"]
        );
        assert!(database.flatten_tree(&tree_oid, 1).await.is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn commits_parse_back(database: Database) {
        let tree_oid = database.store(&Tree::default()).await.unwrap();
        let author = Author::new("A".to_string(), "a@example.com".to_string());
        let commit = Commit::new(vec![], tree_oid.clone(), author, "Initial commit".to_string());
        let oid = database.store(&commit).await.unwrap();

        let parsed = database.load_commit(&oid).await.unwrap();
        assert_eq!(parsed.tree_oid(), &tree_oid);
        assert!(database.load_commit(&tree_oid).await.is_err());
    }

    proptest! {
        #[test]
        fn any_payload_reads_back_unchanged(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let database = Database::new(Arc::new(MemoryFs::new()), "objects");

            let raw = runtime.block_on(async {
                let oid = database
                    .write_object(ObjectType::Blob, Bytes::from(payload.clone()))
                    .await
                    .unwrap();
                database.read_object(&oid).await.unwrap()
            });

            prop_assert_eq!(raw.object_type, ObjectType::Blob);
            prop_assert_eq!(raw.payload, Bytes::from(payload));
        }
    }

    #[rstest]
    #[case::empty(&b""[..])]
    #[case::not_utf8(&[0xff, 0xfe, 0x00, 0x80][..])]
    #[tokio::test]
    async fn edge_payloads_read_back_unchanged(database: Database, #[case] payload: &[u8]) {
        let oid = database
            .write_object(ObjectType::Blob, Bytes::copy_from_slice(payload))
            .await
            .unwrap();

        assert_eq!(database.read_object(&oid).await.unwrap().payload, payload);
    }
}
