use crate::artifacts::objects::object_type::ObjectType;
use std::io::Read;

const CONTINUATION: u8 = 0b1000_0000;
const TYPE_MASK: u8 = 0b0111_0000;
const LOW_SIZE_MASK: u8 = 0b0000_1111;
const SIZE_MASK: u8 = 0b0111_1111;

/// Encode the `(type, size)` header preceding each packed object
///
/// First byte: continuation bit, 3 type bits, low 4 size bits. Each following
/// byte carries 7 more size bits, least significant group first.
pub fn encode_object_header(object_type: ObjectType, size: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(4);
    let mut byte = (object_type.pack_code() << 4) | (size as u8 & LOW_SIZE_MASK);
    let mut rest = size >> 4;

    while rest > 0 {
        header.push(byte | CONTINUATION);
        byte = rest as u8 & SIZE_MASK;
        rest >>= 7;
    }
    header.push(byte);

    header
}

/// Decode an object header, returning the raw type code and the size
///
/// The raw code is returned so callers can tell delta entries (6, 7) from
/// unknown ones.
pub fn decode_object_header(reader: &mut impl Read) -> anyhow::Result<(u8, usize)> {
    let mut byte = [0; 1];
    reader.read_exact(&mut byte)?;

    let type_code = (byte[0] & TYPE_MASK) >> 4;
    let mut size = (byte[0] & LOW_SIZE_MASK) as usize;
    let mut shift = 4;

    while byte[0] & CONTINUATION != 0 {
        reader.read_exact(&mut byte)?;
        if shift > usize::BITS - 7 {
            anyhow::bail!("object size overflows");
        }
        size |= ((byte[0] & SIZE_MASK) as usize) << shift;
        shift += 7;
    }

    Ok((type_code, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(ObjectType::Blob, 0, vec![0x30])]
    #[case(ObjectType::Blob, 15, vec![0x3f])]
    #[case(ObjectType::Blob, 16, vec![0xb0, 0x01])]
    #[case(ObjectType::Commit, 200, vec![0x98, 0x0c])]
    #[case(ObjectType::Tree, 100_000, vec![0xa0, 0xea, 0x30])]
    fn headers_match_git(
        #[case] object_type: ObjectType,
        #[case] size: usize,
        #[case] expected: Vec<u8>,
    ) {
        assert_eq!(encode_object_header(object_type, size), expected);
    }

    proptest! {
        #[test]
        fn sizes_survive_decoding(size in 0usize..(1 << 40)) {
            let header = encode_object_header(ObjectType::Tree, size);
            let (code, decoded) = decode_object_header(&mut header.as_slice()).unwrap();

            prop_assert_eq!(code, ObjectType::Tree.pack_code());
            prop_assert_eq!(decoded, size);
        }
    }

    #[test]
    fn truncated_header_fails() {
        assert!(decode_object_header(&mut [0x90u8].as_slice()).is_err());
    }
}
