use crate::areas::refs::HEAD_REF_NAME;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::UPLOAD_PACK_SERVICE;
use crate::artifacts::protocol::capabilities::CapabilityList;
use crate::artifacts::protocol::pkt_line::{PktLine, PktLineReader, encode_pkt_line, flush_pkt};
use crate::errors::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Placeholder ref name sent when there is nothing to advertise
const NO_REFS_NAME: &str = "capabilities^{}";

/// Refs a server offers, HEAD first, with its capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefAdvertisement {
    pub refs: Vec<(String, ObjectId)>,
    pub capabilities: CapabilityList,
}

impl RefAdvertisement {
    pub fn head(&self) -> Option<&ObjectId> {
        self.get(HEAD_REF_NAME)
    }

    pub fn get(&self, name: &str) -> Option<&ObjectId> {
        self.refs
            .iter()
            .find_map(|(ref_name, oid)| (ref_name == name).then_some(oid))
    }

    /// Smart-HTTP body: service banner, flush, one packet per ref, flush
    ///
    /// Capabilities ride on the first ref after a NUL byte.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        encode_pkt_line(&mut buffer, format!("# service={UPLOAD_PACK_SERVICE}\n").as_bytes())?;
        buffer.put_slice(&flush_pkt());

        let zero = ObjectId::zero();
        let mut refs = self
            .refs
            .iter()
            .map(|(name, oid)| (name.as_str(), oid))
            .collect::<Vec<_>>();
        if refs.is_empty() {
            refs.push((NO_REFS_NAME, &zero));
        }

        for (index, (name, oid)) in refs.into_iter().enumerate() {
            let line = if index == 0 {
                format!("{oid} {name}\0{}\n", self.capabilities)
            } else {
                format!("{oid} {name}\n")
            };
            encode_pkt_line(&mut buffer, line.as_bytes())?;
        }
        buffer.put_slice(&flush_pkt());

        Ok(buffer.freeze())
    }

    pub fn parse(body: Bytes) -> Result<Self> {
        let mut reader = PktLineReader::new(body);
        let mut advertisement = RefAdvertisement::default();
        let mut first = true;

        loop {
            let line = match reader.read()? {
                Some(PktLine::Flush) if first => continue,
                Some(PktLine::Flush) | None => break,
                Some(PktLine::Delim) => continue,
                Some(line) => line,
            };
            let text = line
                .as_text()
                .ok_or_else(|| Error::Protocol("ref advertisement is not utf-8".to_string()))?;
            if text.starts_with("# service=") {
                continue;
            }

            let (text, capabilities) = match text.split_once('\0') {
                Some((text, capabilities)) => (text, Some(capabilities)),
                None => (text, None),
            };
            if first {
                advertisement.capabilities = CapabilityList::parse(capabilities.unwrap_or(""));
                first = false;
            }

            let (oid, name) = text
                .split_once(' ')
                .ok_or_else(|| Error::Protocol(format!("malformed ref line {text:?}")))?;
            if name == NO_REFS_NAME {
                continue;
            }
            let oid = ObjectId::try_parse(oid.to_string())
                .map_err(|err| Error::Protocol(format!("malformed ref line {text:?}: {err}")))?;
            advertisement.refs.push((name.to_string(), oid));
        }

        Ok(advertisement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::protocol::capabilities::Capabilities;
    use pretty_assertions::assert_eq;

    fn oid(byte: char) -> ObjectId {
        ObjectId::try_parse(byte.to_string().repeat(40)).unwrap()
    }

    fn advertisement() -> RefAdvertisement {
        RefAdvertisement {
            refs: vec![
                ("HEAD".to_string(), oid('a')),
                ("refs/heads/master".to_string(), oid('a')),
            ],
            capabilities: CapabilityList {
                flags: Capabilities::SIDE_BAND_64K | Capabilities::SYMREF,
                symref: Some(("HEAD".to_string(), "refs/heads/master".to_string())),
                agent: Some("bit-vaults/test".to_string()),
            },
        }
    }

    #[test]
    fn capabilities_ride_on_the_first_ref_only() {
        let encoded = advertisement().encode().unwrap();

        let expected = [
            "001e# service=git-upload-pack\n",
            "0000",
            "0074aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa HEAD\0side-band-64k symref=HEAD:refs/heads/master agent=bit-vaults/test\n",
            "003faaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa refs/heads/master\n",
            "0000",
        ]
        .concat();
        assert_eq!(String::from_utf8(encoded.to_vec()).unwrap(), expected);
    }

    #[test]
    fn parse_reads_back_refs_and_capabilities() {
        let original = advertisement();

        let parsed = RefAdvertisement::parse(original.encode().unwrap()).unwrap();

        assert_eq!(parsed, original);
        assert_eq!(parsed.head(), Some(&oid('a')));
    }

    #[test]
    fn empty_repositories_advertise_capabilities_only() {
        let empty = RefAdvertisement {
            refs: vec![],
            capabilities: CapabilityList::parse("side-band-64k"),
        };

        let parsed = RefAdvertisement::parse(empty.encode().unwrap()).unwrap();

        assert!(parsed.refs.is_empty());
        assert!(parsed.capabilities.flags.contains(Capabilities::SIDE_BAND_64K));
    }

    #[test]
    fn malformed_oids_are_protocol_errors() {
        let mut body = BytesMut::new();
        encode_pkt_line(&mut body, b"not-an-oid HEAD\0\n").unwrap();
        body.put_slice(b"0000");

        assert!(matches!(
            RefAdvertisement::parse(body.freeze()),
            Err(Error::Protocol(_))
        ));
    }
}
