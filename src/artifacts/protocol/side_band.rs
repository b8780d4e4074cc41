//! Side-band-64k multiplexing
//!
//! Each pkt-line payload starts with a band byte: 1 carries pack data, 2
//! progress text, 3 a fatal error. The stream ends with a flush packet once
//! every source is exhausted.

use crate::artifacts::protocol::pkt_line::{
    FLUSH_PKT, MAX_PKT_DATA, PktLine, PktLineReader, encode_pkt_line,
};
use crate::errors::{Error, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Largest chunk of data one banded packet can carry
pub const MAX_BAND_DATA: usize = MAX_PKT_DATA - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Band {
    Data = 1,
    Progress = 2,
    Fatal = 3,
}

impl TryFrom<u8> for Band {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Band::Data),
            2 => Ok(Band::Progress),
            3 => Ok(Band::Fatal),
            other => Err(Error::PktLineCorrupt(format!("unknown side-band {other}"))),
        }
    }
}

/// Out-of-band message sent alongside the pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Message(String),
    /// Ends the stream; the peer treats the pack as failed
    Fatal(String),
}

/// Writes banded packets, splitting data so no packet exceeds the limit
#[derive(Debug)]
pub struct SideBandWriter<W> {
    writer: W,
}

impl<W> SideBandWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        SideBandWriter { writer }
    }

    pub async fn write_band(&mut self, band: Band, data: &[u8]) -> Result<()> {
        let mut buffer = BytesMut::new();
        for chunk in data.chunks(MAX_BAND_DATA) {
            buffer.clear();
            let mut payload = Vec::with_capacity(chunk.len() + 1);
            payload.push(band as u8);
            payload.extend_from_slice(chunk);
            encode_pkt_line(&mut buffer, &payload)?;
            self.writer.write_all(&buffer).await?;
        }

        Ok(())
    }

    /// Terminate the stream with a flush packet
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.write_all(FLUSH_PKT).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Interleave `pack` (band 1) with `progress` (bands 2 and 3) onto `out`
///
/// Runs until the pack reaches end of stream and every progress sender is
/// gone, or a fatal message arrives, then writes the closing flush.
pub async fn mux<R, W>(mut pack: R, mut progress: mpsc::Receiver<Progress>, out: W) -> Result<W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut writer = SideBandWriter::new(out);
    let mut buffer = vec![0; MAX_BAND_DATA];
    let mut pack_open = true;
    let mut progress_open = true;

    while pack_open || progress_open {
        tokio::select! {
            read = pack.read(&mut buffer), if pack_open => {
                match read {
                    Ok(0) => pack_open = false,
                    Ok(n) => writer.write_band(Band::Data, &buffer[..n]).await?,
                    Err(err) => {
                        warn!(error = %err, "pack stream failed");
                        writer.write_band(Band::Fatal, format!("{err}\n").as_bytes()).await?;
                        break;
                    }
                }
            }
            message = progress.recv(), if progress_open => {
                match message {
                    Some(Progress::Message(text)) => {
                        writer.write_band(Band::Progress, text.as_bytes()).await?;
                    }
                    Some(Progress::Fatal(text)) => {
                        writer.write_band(Band::Fatal, text.as_bytes()).await?;
                        break;
                    }
                    None => progress_open = false,
                }
            }
        }
    }

    writer.flush().await?;
    debug!("side-band stream complete");
    Ok(writer.into_inner())
}

/// The three bands of a side-band stream, separated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demuxed {
    pub pack: Bytes,
    pub progress: Vec<String>,
    pub error: Option<String>,
}

/// Split a side-band stream up to its flush packet
pub fn demux(reader: &mut PktLineReader) -> Result<Demuxed> {
    let mut pack = BytesMut::new();
    let mut demuxed = Demuxed::default();

    loop {
        match reader.read()? {
            Some(PktLine::Data(data)) => {
                let (band, payload) = data
                    .split_first()
                    .ok_or_else(|| Error::PktLineCorrupt("empty side-band packet".to_string()))?;
                match Band::try_from(*band)? {
                    Band::Data => pack.extend_from_slice(payload),
                    Band::Progress => demuxed
                        .progress
                        .push(String::from_utf8_lossy(payload).into_owned()),
                    Band::Fatal => {
                        demuxed.error = Some(String::from_utf8_lossy(payload).trim_end().to_string());
                    }
                }
            }
            Some(PktLine::Delim) => continue,
            Some(PktLine::Flush) => break,
            None => {
                if demuxed.error.is_none() {
                    return Err(Error::PktLineCorrupt(
                        "side-band stream ended without a flush".to_string(),
                    ));
                }
                break;
            }
        }
    }

    demuxed.pack = pack.freeze();
    Ok(demuxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::protocol::pkt_line::MAX_PKT_LEN;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn large_payloads_are_split_under_the_limit() {
        let data = vec![7u8; MAX_BAND_DATA * 2 + 10];
        let mut writer = SideBandWriter::new(Vec::new());
        writer.write_band(Band::Data, &data).await.unwrap();
        writer.flush().await.unwrap();

        let mut reader = PktLineReader::new(writer.into_inner().into());
        let mut sizes = Vec::new();
        while let Some(PktLine::Data(packet)) = reader.read().unwrap() {
            sizes.push(packet.len() + 4);
        }

        assert_eq!(sizes, vec![MAX_PKT_LEN, MAX_PKT_LEN, 15]);
    }

    #[tokio::test]
    async fn mux_interleaves_and_flushes() {
        let (sender, receiver) = mpsc::channel(4);
        sender
            .send(Progress::Message("counting objects\n".to_string()))
            .await
            .unwrap();
        drop(sender);

        let pack: &[u8] = b"PACKDATA";
        let out = mux(pack, receiver, Vec::new()).await.unwrap();

        assert!(out.ends_with(b"0000"));
        let demuxed = demux(&mut PktLineReader::new(out.into())).unwrap();
        assert_eq!(demuxed.pack, Bytes::from_static(b"PACKDATA"));
        assert_eq!(demuxed.progress, vec!["counting objects\n".to_string()]);
        assert_eq!(demuxed.error, None);
    }

    #[tokio::test]
    async fn fatal_messages_travel_on_the_error_band() {
        let (sender, receiver) = mpsc::channel(1);
        sender
            .send(Progress::Fatal("object missing".to_string()))
            .await
            .unwrap();

        // the pack never ends; the fatal message stops the stream
        let (pack, _keep_open) = tokio::io::duplex(64);
        let out = mux(pack, receiver, Vec::new()).await.unwrap();

        let demuxed = demux(&mut PktLineReader::new(out.into())).unwrap();
        assert_eq!(demuxed.error.as_deref(), Some("object missing"));
    }

    #[test]
    fn unknown_bands_are_corrupt() {
        let mut reader = PktLineReader::new(Bytes::from_static(b"0006\x09x0000"));
        assert!(demux(&mut reader).is_err());
    }
}
