//! Blob object
//!
//! Blobs hold a secret's content. They carry no metadata: names and modes
//! live in the tree that references them.
//!
//! ## Format
//!
//! On disk: `blob <size>\0<content>`

use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::BufRead;

/// Opaque byte payload
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    content: Bytes,
}

impl Blob {
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        Ok(self.content.clone())
    }
}

impl Unpackable for Blob {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;

        Ok(Self::new(content.into()))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_hash_matches_git() {
        // printf 'hello world' | git hash-object --stdin
        let blob = Blob::new(Bytes::from_static(b"hello world"));
        assert_eq!(
            blob.object_id().unwrap().as_ref(),
            "95d09f2b10159347eece71399a7e2e907ea3df4f"
        );
    }

    #[test]
    fn blob_content_is_read_verbatim() {
        let raw: &[u8] = &[0xff, 0x00, 0xfe];
        let blob = Blob::deserialize(std::io::Cursor::new(raw)).unwrap();

        assert_eq!(blob.serialize().unwrap(), Bytes::copy_from_slice(raw));
    }
}
