//! Object identifier (SHA-1 hash)
//!
//! Object IDs are 40-character lowercase hexadecimal strings representing
//! SHA-1 digests. Identity is content: the same bytes always hash to the same
//! id.
//!
//! ## Storage
//!
//! Loose objects live at `objects/<first-2-chars>/<remaining-38-chars>`.

use crate::artifacts::objects::{OBJECT_ID_BYTES, OBJECT_ID_LENGTH};
use serde::{Deserialize, Serialize};
use std::io;

/// Object identifier
///
/// Always holds a validated, lowercase, 40-character hex string.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object ID from a string
    ///
    /// Uppercase hex digits are accepted and normalized.
    pub fn try_parse(id: String) -> anyhow::Result<Self> {
        if id.len() != OBJECT_ID_LENGTH {
            return Err(anyhow::anyhow!("Invalid object ID length: {}", id.len()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid object ID characters: {}", id));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Whether `candidate` has the shape of a full object id
    pub fn is_oid(candidate: &str) -> bool {
        candidate.len() == OBJECT_ID_LENGTH && candidate.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// The all-zero id used in advertisements of empty repositories
    pub fn zero() -> Self {
        Self("0".repeat(OBJECT_ID_LENGTH))
    }

    pub fn from_raw(bytes: &[u8; OBJECT_ID_BYTES]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn from_digest(digest: &[u8]) -> anyhow::Result<Self> {
        if digest.len() != OBJECT_ID_BYTES {
            return Err(anyhow::anyhow!("Invalid digest length: {}", digest.len()));
        }
        Ok(Self(hex::encode(digest)))
    }

    /// Write the object ID in binary format (20 bytes)
    ///
    /// Used when serializing tree entries.
    pub fn write_h40_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read an object ID from binary format (20 bytes)
    pub fn read_h40_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut buffer = [0; OBJECT_ID_BYTES];
        reader.read_exact(&mut buffer)?;

        Self::from_digest(&buffer)
    }

    pub fn to_bytes(&self) -> anyhow::Result<[u8; OBJECT_ID_BYTES]> {
        let mut bytes = [0; OBJECT_ID_BYTES];
        hex::decode_to_slice(&self.0, &mut bytes)?;
        Ok(bytes)
    }

    /// Convert to the loose-object path
    ///
    /// For example, `abc123...` becomes `ab/c123...`
    pub fn to_path(&self) -> String {
        let (dir, file) = self.0.split_at(2);
        format!("{dir}/{file}")
    }

    /// First 7 characters of the hash
    pub fn to_short_oid(&self) -> String {
        self.0.split_at(7).0.to_string()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        Self::try_parse(value)
    }
}

impl TryFrom<&str> for ObjectId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        Self::try_parse(value.to_string())
    }
}

impl From<ObjectId> for String {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::proptest;

    proptest! {
        #[test]
        fn binary_form_round_trips(id in "[0-9a-f]{40}") {
            let oid = ObjectId::try_parse(id.clone()).unwrap();
            let mut bytes = Vec::new();
            oid.write_h40_to(&mut bytes).unwrap();

            assert_eq!(bytes.len(), OBJECT_ID_BYTES);
            assert_eq!(ObjectId::read_h40_from(&mut bytes.as_slice()).unwrap(), oid);
        }

        #[test]
        fn wrong_lengths_are_rejected(id in "[0-9a-f]{1,39}") {
            assert!(ObjectId::try_parse(id).is_err());
        }
    }

    #[test]
    fn uppercase_is_normalized() {
        let oid = ObjectId::try_parse("ABCDEF0123456789ABCDEF0123456789ABCDEF01".to_string())
            .unwrap();
        assert_eq!(oid.as_ref(), "abcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn loose_path_splits_after_two_chars() {
        let oid = ObjectId::try_parse("4b825dc642cb6eb9a060e54bf8d69288fbee4904".to_string())
            .unwrap();
        assert_eq!(
            oid.to_path(),
            "4b/825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }
}
