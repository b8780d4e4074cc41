use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use anyhow::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::BufRead;

/// Canonical encoding of an object's body (without the `<kind> <size>\0` header)
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

pub trait Unpackable {
    /// Parse an object body; the header has already been consumed
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    fn object_id(&self) -> Result<ObjectId> {
        let content = self.serialize()?;
        Ok(hash_object(self.object_type(), &content))
    }
}

/// Hash `payload` as an object of the given kind
pub fn hash_object(object_type: ObjectType, payload: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(object_type.header(payload.len()).as_bytes());
    hasher.update(payload);

    let mut digest = [0; OBJECT_ID_BYTES];
    digest.copy_from_slice(&hasher.finalize());
    ObjectId::from_raw(&digest)
}

/// A decoded object of any kind
#[derive(Debug, Clone)]
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
}

impl ObjectBox {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
        }
    }
}
