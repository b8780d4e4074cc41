use crate::areas::database::Database;
use crate::artifacts::objects::object::hash_object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::header::decode_object_header;
use crate::artifacts::pack::{PACK_SIGNATURE, PACK_VERSION};
use crate::errors::{Error, Result};
use byteorder::{ByteOrder, NetworkEndian};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::Read;
use tracing::debug;

const HEADER_SIZE: usize = 12;
const TRAILER_SIZE: usize = 20;
/// One header byte plus the smallest zlib stream
const MIN_ENTRY_SIZE: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct PackedObject {
    pub oid: ObjectId,
    pub object_type: ObjectType,
    pub payload: Bytes,
}

/// Decodes a complete, non-delta packfile held in memory
#[derive(Debug, Clone)]
pub struct PackReader {
    data: Bytes,
}

fn corrupt(reason: impl std::fmt::Display) -> Error {
    Error::PackCorrupt(reason.to_string())
}

impl PackReader {
    pub fn new(data: Bytes) -> Self {
        PackReader { data }
    }

    /// Validate framing and checksum, then inflate every entry
    pub fn objects(&self) -> Result<Vec<PackedObject>> {
        let data = &self.data[..];
        if data.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(corrupt("pack is truncated"));
        }
        if &data[..4] != PACK_SIGNATURE {
            return Err(corrupt("missing PACK signature"));
        }

        let version = NetworkEndian::read_u32(&data[4..8]);
        if version != PACK_VERSION {
            return Err(corrupt(format!("unsupported pack version {version}")));
        }
        let count = NetworkEndian::read_u32(&data[8..12]) as usize;

        let (body, trailer) = data.split_at(data.len() - TRAILER_SIZE);
        if Sha1::digest(body).as_slice() != trailer {
            return Err(corrupt("pack checksum mismatch"));
        }

        // every entry needs at least a header byte and a zlib stream
        let entries_len = body.len() - HEADER_SIZE;
        if count > entries_len / MIN_ENTRY_SIZE {
            return Err(corrupt(format!(
                "{count} objects cannot fit in {entries_len} bytes"
            )));
        }

        let mut objects = Vec::with_capacity(count);
        let mut offset = HEADER_SIZE;
        for _ in 0..count {
            let (object, consumed) = Self::read_entry(&body[offset..])?;
            objects.push(object);
            offset += consumed;
        }
        if offset != body.len() {
            return Err(corrupt(format!(
                "{} trailing bytes after {count} objects",
                body.len() - offset
            )));
        }

        Ok(objects)
    }

    fn read_entry(entry: &[u8]) -> Result<(PackedObject, usize)> {
        let mut cursor = entry;
        let (type_code, size) = decode_object_header(&mut cursor).map_err(corrupt)?;
        let header_len = entry.len() - cursor.len();

        let object_type = match type_code {
            6 | 7 => return Err(corrupt("delta entries are not supported")),
            code => ObjectType::from_pack_code(code).map_err(corrupt)?,
        };

        let mut decoder = flate2::bufread::ZlibDecoder::new(cursor);
        // the declared size is untrusted, never inflate past it
        let mut payload = Vec::with_capacity(size.min(cursor.len()));
        decoder
            .by_ref()
            .take((size as u64).saturating_add(1))
            .read_to_end(&mut payload)
            .map_err(corrupt)?;
        if payload.len() != size {
            return Err(corrupt(format!(
                "entry declares {size} bytes, inflated {}",
                payload.len()
            )));
        }
        let consumed = header_len + decoder.total_in() as usize;

        let oid = hash_object(object_type, &payload);
        Ok((
            PackedObject {
                oid,
                object_type,
                payload: payload.into(),
            },
            consumed,
        ))
    }

    /// Store every object of the pack, returning their ids
    pub async fn unpack_into(&self, database: &Database) -> Result<Vec<ObjectId>> {
        let mut stored = Vec::new();
        for object in self.objects()? {
            let oid = database
                .write_object(object.object_type, object.payload)
                .await?;
            stored.push(oid);
        }

        debug!(objects = stored.len(), "unpacked pack");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::pack::header::encode_object_header;
    use std::io::Write;

    fn pack_of(entries: &[(u8, &[u8])]) -> Vec<u8> {
        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&(entries.len() as u32).to_be_bytes());
        for (code, payload) in entries {
            let mut header = encode_object_header(ObjectType::Blob, payload.len());
            header[0] = (header[0] & 0b1000_1111) | (code << 4);
            pack.extend_from_slice(&header);
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(payload).unwrap();
            pack.extend_from_slice(&encoder.finish().unwrap());
        }
        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);
        pack
    }

    #[test]
    fn entries_are_inflated_and_hashed() {
        let pack = pack_of(&[(3, &b"hello world"[..]), (3, &b""[..])]);

        let objects = PackReader::new(pack.into()).objects().unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(
            objects[0].oid.as_ref(),
            "95d09f2b10159347eece71399a7e2e907ea3df4f"
        );
        assert_eq!(
            objects[1].oid.as_ref(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn delta_entries_are_rejected() {
        let pack = pack_of(&[(7, &b"delta"[..])]);

        let err = PackReader::new(pack.into()).objects().unwrap_err();
        assert!(matches!(err, Error::PackCorrupt(_)));
    }

    #[test]
    fn flipped_bits_fail_the_checksum() {
        let mut pack = pack_of(&[(3, &b"hello world"[..])]);
        pack[14] ^= 0xff;

        let err = PackReader::new(pack.into()).objects().unwrap_err();
        assert!(matches!(err, Error::PackCorrupt(_)));
    }

    fn seal(mut pack: Vec<u8>) -> Bytes {
        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);
        pack.into()
    }

    #[test]
    fn oversized_entry_sizes_are_rejected_without_allocating() {
        let mut pack = pack_of(&[]);
        pack.truncate(pack.len() - 20);
        pack[11] = 1;
        pack.extend_from_slice(&encode_object_header(ObjectType::Blob, 1 << 56));
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"x").unwrap();
        pack.extend_from_slice(&encoder.finish().unwrap());

        let err = PackReader::new(seal(pack)).objects().unwrap_err();
        assert!(matches!(err, Error::PackCorrupt(_)));
    }

    #[test]
    fn object_counts_beyond_the_input_are_rejected() {
        let mut pack = pack_of(&[(3, &b"hello world"[..])]);
        pack.truncate(pack.len() - 20);
        pack[8..12].copy_from_slice(&u32::MAX.to_be_bytes());

        let err = PackReader::new(seal(pack)).objects().unwrap_err();
        assert!(matches!(err, Error::PackCorrupt(reason) if reason.contains("cannot fit")));
    }

    #[test]
    fn truncated_packs_are_rejected() {
        let pack = pack_of(&[(3, &b"hello world"[..])]);

        assert!(PackReader::new(Bytes::copy_from_slice(&pack[..20])).objects().is_err());
    }
}
