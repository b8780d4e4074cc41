use crate::errors::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Length of the hex prefix
pub const PKT_HEADER_LEN: usize = 4;

/// Largest packet, prefix included
pub const MAX_PKT_LEN: usize = 65520;

/// Largest payload a single packet can carry
pub const MAX_PKT_DATA: usize = MAX_PKT_LEN - PKT_HEADER_LEN;

pub const FLUSH_PKT: &[u8; 4] = b"0000";

pub const DELIM_PKT: &[u8; 4] = b"0001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    Data(Bytes),
    Flush,
    Delim,
}

impl PktLine {
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            PktLine::Data(data) => Some(data),
            PktLine::Flush | PktLine::Delim => None,
        }
    }

    /// Payload as text without its trailing newline
    pub fn as_text(&self) -> Option<&str> {
        self.data()
            .and_then(|data| std::str::from_utf8(data).ok())
            .map(|text| text.strip_suffix('\n').unwrap_or(text))
    }
}

fn corrupt(reason: impl std::fmt::Display) -> Error {
    Error::PktLineCorrupt(reason.to_string())
}

/// Append one data packet to `buffer`
pub fn encode_pkt_line(buffer: &mut BytesMut, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PKT_DATA {
        return Err(corrupt(format!(
            "payload of {} bytes exceeds the packet limit",
            payload.len()
        )));
    }

    buffer.reserve(PKT_HEADER_LEN + payload.len());
    buffer.put_slice(format!("{:04x}", payload.len() + PKT_HEADER_LEN).as_bytes());
    buffer.put_slice(payload);

    Ok(())
}

/// Single data packet as its own buffer
pub fn pkt_line(payload: &[u8]) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    encode_pkt_line(&mut buffer, payload)?;
    Ok(buffer.freeze())
}

/// The `0000` packet closing a section
pub fn flush_pkt() -> Bytes {
    Bytes::from_static(FLUSH_PKT)
}

fn parse_length(prefix: &[u8]) -> Result<usize> {
    let prefix = std::str::from_utf8(prefix).map_err(|_| corrupt("length prefix is not ascii"))?;
    if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(corrupt(format!("invalid length prefix {prefix:?}")));
    }

    usize::from_str_radix(prefix, 16).map_err(corrupt)
}

fn classify(length: usize) -> Result<Option<PktLine>> {
    match length {
        0 => Ok(Some(PktLine::Flush)),
        1 => Ok(Some(PktLine::Delim)),
        2..PKT_HEADER_LEN => Err(corrupt(format!("reserved packet length {length}"))),
        length if length > MAX_PKT_LEN => {
            Err(corrupt(format!("packet length {length} exceeds the limit")))
        }
        _ => Ok(None),
    }
}

/// Reads packets from an in-memory buffer
#[derive(Debug, Clone)]
pub struct PktLineReader {
    data: Bytes,
    position: usize,
}

impl PktLineReader {
    pub fn new(data: Bytes) -> Self {
        PktLineReader { data, position: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> Bytes {
        self.data.slice(self.position.min(self.data.len())..)
    }

    /// Next packet, or `None` at a clean end of input
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        if self.is_empty() {
            return Ok(None);
        }

        let rest = &self.data[self.position..];
        if rest.len() < PKT_HEADER_LEN {
            return Err(corrupt("truncated length prefix"));
        }
        let length = parse_length(&rest[..PKT_HEADER_LEN])?;
        if let Some(control) = classify(length)? {
            self.position += PKT_HEADER_LEN;
            return Ok(Some(control));
        }
        if rest.len() < length {
            return Err(corrupt(format!(
                "packet declares {length} bytes, {} available",
                rest.len()
            )));
        }

        let start = self.position + PKT_HEADER_LEN;
        self.position += length;
        Ok(Some(PktLine::Data(self.data.slice(start..self.position))))
    }
}

impl Iterator for PktLineReader {
    type Item = Result<PktLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Read one packet from a stream, `None` on end of stream
pub async fn read_pkt_line<R>(reader: &mut R) -> Result<Option<PktLine>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0; PKT_HEADER_LEN];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let length = parse_length(&prefix)?;
    if let Some(control) = classify(length)? {
        return Ok(Some(control));
    }

    let mut payload = vec![0; length - PKT_HEADER_LEN];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|_| corrupt("truncated packet payload"))?;

    Ok(Some(PktLine::Data(payload.into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn length_includes_the_prefix() {
        assert_eq!(
            pkt_line(b"want 1234\n").unwrap(),
            Bytes::from_static(b"000ewant 1234\n")
        );
        assert_eq!(pkt_line(b"").unwrap(), Bytes::from_static(b"0004"));
    }

    #[test]
    fn oversized_payloads_are_refused() {
        assert!(pkt_line(&vec![0; MAX_PKT_DATA]).is_ok());
        assert!(pkt_line(&vec![0; MAX_PKT_DATA + 1]).is_err());
    }

    #[test]
    fn reader_splits_packets_and_control_markers() {
        let mut reader = PktLineReader::new(Bytes::from_static(b"0009done\n00010000"));

        assert_eq!(reader.next().unwrap().unwrap().as_text(), Some("done"));
        assert_eq!(reader.next().unwrap().unwrap(), PktLine::Delim);
        assert_eq!(reader.next().unwrap().unwrap(), PktLine::Flush);
        assert!(reader.next().is_none());
    }

    #[rstest]
    #[case(&b"00"[..])]
    #[case(&b"zzzz"[..])]
    #[case(&b"0002"[..])]
    #[case(&b"000ashort"[..])]
    #[case(&b"fff5"[..])]
    fn malformed_input_is_corrupt(#[case] input: &'static [u8]) {
        let mut reader = PktLineReader::new(Bytes::from_static(input));
        assert!(matches!(reader.read(), Err(Error::PktLineCorrupt(_))));
    }

    #[tokio::test]
    async fn stream_reader_matches_buffer_reader() {
        let mut stream: &[u8] = b"0008abcd0000";

        assert_eq!(
            read_pkt_line(&mut stream).await.unwrap(),
            Some(PktLine::Data(Bytes::from_static(b"abcd")))
        );
        assert_eq!(read_pkt_line(&mut stream).await.unwrap(), Some(PktLine::Flush));
        assert_eq!(read_pkt_line(&mut stream).await.unwrap(), None);
    }
}
