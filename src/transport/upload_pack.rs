use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::capabilities::CapabilityList;
use crate::artifacts::protocol::pkt_line::{PktLine, PktLineReader, encode_pkt_line, flush_pkt};
use crate::errors::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// What a client asks for in a `git-upload-pack` request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPackRequest {
    pub wants: Vec<ObjectId>,
    pub haves: Vec<ObjectId>,
    /// Commits the client already holds as shallow boundaries
    pub shallow: Vec<ObjectId>,
    pub depth: Option<usize>,
    /// `deepen-since` cutoff, seconds since the epoch
    pub since: Option<i64>,
    /// Capabilities sent on the first want line
    pub capabilities: CapabilityList,
    pub done: bool,
}

fn parse_oid(line: &str, raw: &str) -> Result<ObjectId> {
    ObjectId::try_parse(raw.to_string())
        .map_err(|err| Error::Protocol(format!("malformed line {line:?}: {err}")))
}

impl UploadPackRequest {
    pub fn is_deepening(&self) -> bool {
        self.depth.is_some() || self.since.is_some()
    }

    pub fn parse(body: Bytes) -> Result<Self> {
        let mut request = UploadPackRequest::default();

        for line in PktLineReader::new(body) {
            let line = match line? {
                PktLine::Data(data) => data,
                PktLine::Flush | PktLine::Delim => continue,
            };
            let text = std::str::from_utf8(&line)
                .map_err(|_| Error::Protocol("request line is not utf-8".to_string()))?
                .trim_end_matches('\n');
            let (command, argument) = text.split_once(' ').unwrap_or((text, ""));

            match command {
                "want" => {
                    let (oid, capabilities) = argument.split_once(' ').unwrap_or((argument, ""));
                    if request.wants.is_empty() {
                        request.capabilities = CapabilityList::parse(capabilities);
                    }
                    request.wants.push(parse_oid(text, oid)?);
                }
                "have" => request.haves.push(parse_oid(text, argument)?),
                "shallow" => request.shallow.push(parse_oid(text, argument)?),
                "deepen" => {
                    let depth = argument
                        .parse()
                        .map_err(|_| Error::Protocol(format!("malformed line {text:?}")))?;
                    request.depth = Some(depth);
                }
                "deepen-since" => {
                    let since = argument
                        .parse()
                        .map_err(|_| Error::Protocol(format!("malformed line {text:?}")))?;
                    request.since = Some(since);
                }
                "done" => request.done = true,
                other => return Err(Error::Protocol(format!("unexpected command {other:?}"))),
            }
        }

        if request.wants.is_empty() {
            return Err(Error::Protocol("request has no want line".to_string()));
        }

        Ok(request)
    }

    /// Request body: wants with capabilities, shallow and deepen lines,
    /// flush, haves, `done`
    pub fn encode(&self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();

        for (index, want) in self.wants.iter().enumerate() {
            let line = if index == 0 {
                format!("want {want} {}\n", self.capabilities)
            } else {
                format!("want {want}\n")
            };
            encode_pkt_line(&mut buffer, line.as_bytes())?;
        }
        for oid in &self.shallow {
            encode_pkt_line(&mut buffer, format!("shallow {oid}\n").as_bytes())?;
        }
        if let Some(depth) = self.depth {
            encode_pkt_line(&mut buffer, format!("deepen {depth}\n").as_bytes())?;
        }
        if let Some(since) = self.since {
            encode_pkt_line(&mut buffer, format!("deepen-since {since}\n").as_bytes())?;
        }
        buffer.put_slice(&flush_pkt());

        for have in &self.haves {
            encode_pkt_line(&mut buffer, format!("have {have}\n").as_bytes())?;
        }
        if self.done {
            encode_pkt_line(&mut buffer, b"done\n")?;
        }

        Ok(buffer.freeze())
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

    #[test]
    fn parses_a_git_style_request() {
        let body = [
            "004cwant aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa side-band-64k no-progress\n",
            "0032want bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb\n",
            "000ddeepen 1\n",
            "0000",
            "0032have cccccccccccccccccccccccccccccccccccccccc\n",
            "0009done\n",
        ]
        .concat();

        let request = UploadPackRequest::parse(Bytes::from(body)).unwrap();

        assert_eq!(request.wants, vec![oid('a'), oid('b')]);
        assert_eq!(request.haves, vec![oid('c')]);
        assert_eq!(request.depth, Some(1));
        assert!(request.done);
        assert_eq!(
            request.capabilities.flags,
            Capabilities::SIDE_BAND_64K | Capabilities::NO_PROGRESS
        );
    }

    #[test]
    fn encode_and_parse_agree() {
        let request = UploadPackRequest {
            wants: vec![oid('a')],
            haves: vec![oid('b')],
            shallow: vec![oid('c')],
            depth: Some(2),
            since: Some(1_700_000_000),
            capabilities: CapabilityList::parse("side-band-64k agent=bit-vaults/test"),
            done: true,
        };

        assert_eq!(UploadPackRequest::parse(request.encode().unwrap()).unwrap(), request);
    }

    #[test]
    fn requests_need_a_valid_want() {
        assert!(matches!(
            UploadPackRequest::parse(Bytes::from_static(b"0000")),
            Err(Error::Protocol(_))
        ));
        assert!(matches!(
            UploadPackRequest::parse(Bytes::from_static(b"000ewant 1234\n0000")),
            Err(Error::Protocol(_))
        ));
    }
}
