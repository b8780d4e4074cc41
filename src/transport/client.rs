use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::protocol::pkt_line::{PktLine, PktLineReader, read_pkt_line};
use crate::artifacts::protocol::side_band::demux;
use crate::artifacts::protocol::{ProtocolConfig, UPLOAD_PACK_SERVICE};
use crate::errors::{Error, Result};
use crate::transport::advertisement::RefAdvertisement;
use crate::transport::request::{GitRequest, GitResponse, ResponseBody};
use crate::transport::upload_pack::UploadPackRequest;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

/// Carries requests to a peer and brings back its response
#[async_trait]
pub trait GitTransport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: GitRequest) -> Result<GitResponse>;
}

/// Result of a fetch: the pack plus what the server said alongside it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPack {
    pub pack: Bytes,
    pub progress: Vec<String>,
    pub shallow: BTreeSet<ObjectId>,
    pub unshallow: BTreeSet<ObjectId>,
}

#[derive(Debug, Clone)]
pub struct GitClient {
    transport: Arc<dyn GitTransport>,
    protocol: ProtocolConfig,
    requester: String,
}

impl GitClient {
    pub fn new(transport: Arc<dyn GitTransport>, protocol: ProtocolConfig, requester: &str) -> Self {
        GitClient {
            transport,
            protocol,
            requester: requester.to_string(),
        }
    }

    async fn send(&self, vault: &str, request: GitRequest) -> Result<GitResponse> {
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        let status = response.status;
        let message = response.into_bytes().await.unwrap_or_default();
        let message = String::from_utf8_lossy(&message).trim_end().to_string();
        Err(match status.as_u16() {
            404 => match Self::missing_object(&message) {
                Some(oid) => Error::ObjectNotFound { oid },
                None => Error::VaultUndefined {
                    name: vault.to_string(),
                },
            },
            403 => Error::AccessDenied {
                vault: vault.to_string(),
                requester: self.requester.clone(),
            },
            405 => Error::UnsupportedService(message),
            _ => Error::Protocol(format!("peer answered {status}: {message}")),
        })
    }

    /// The object named by a `object <oid> not found` answer
    fn missing_object(message: &str) -> Option<ObjectId> {
        let oid = message.strip_prefix("object ")?.strip_suffix(" not found")?;
        ObjectId::try_parse(oid.to_string()).ok()
    }

    pub async fn discover_refs(&self, vault: &str) -> Result<RefAdvertisement> {
        let request = GitRequest::discover_refs(vault, UPLOAD_PACK_SERVICE, &self.requester);
        let body = self.send(vault, request).await?.into_bytes().await?;

        let advertisement = RefAdvertisement::parse(body)?;
        debug!(vault, refs = advertisement.refs.len(), "discovered refs");
        Ok(advertisement)
    }

    /// Fetch the closure of `wants`, optionally limited to `depth` commits
    pub async fn fetch_pack(
        &self,
        vault: &str,
        wants: &[ObjectId],
        haves: &[ObjectId],
        depth: Option<usize>,
    ) -> Result<FetchedPack> {
        let request = UploadPackRequest {
            wants: wants.to_vec(),
            haves: haves.to_vec(),
            depth,
            capabilities: self.protocol.requested(),
            done: true,
            ..UploadPackRequest::default()
        };
        let body = request.encode()?;

        let response = self
            .send(vault, GitRequest::upload_pack(vault, &self.requester, body))
            .await?;
        let mut stream: std::pin::Pin<Box<dyn AsyncRead + Send>> = match response.body {
            ResponseBody::Full(bytes) => Box::pin(std::io::Cursor::new(bytes)),
            ResponseBody::Stream(stream) => stream,
        };

        let mut fetched = FetchedPack::default();
        if request.is_deepening() {
            Self::read_shallow_section(&mut stream, &mut fetched).await?;
        }

        match read_pkt_line(&mut stream).await?.as_ref().and_then(PktLine::as_text) {
            Some("NAK") => {}
            Some(other) => {
                return Err(Error::Protocol(format!("expected NAK, got {other:?}")));
            }
            None => return Err(Error::Protocol("expected NAK".to_string())),
        }

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await?;
        let demuxed = demux(&mut PktLineReader::new(rest.into()))?;
        if let Some(error) = demuxed.error {
            return Err(Error::PackCorrupt(format!("peer aborted the pack: {error}")));
        }

        fetched.pack = demuxed.pack;
        fetched.progress = demuxed.progress;
        info!(vault, bytes = fetched.pack.len(), "fetched pack");
        Ok(fetched)
    }

    async fn read_shallow_section<R>(stream: &mut R, fetched: &mut FetchedPack) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let line = read_pkt_line(stream)
                .await?
                .ok_or_else(|| Error::Protocol("shallow section ended early".to_string()))?;
            let Some(text) = line.as_text() else {
                return Ok(());
            };

            let (kind, oid) = text
                .split_once(' ')
                .ok_or_else(|| Error::Protocol(format!("malformed shallow line {text:?}")))?;
            let oid = ObjectId::try_parse(oid.to_string())
                .map_err(|err| Error::Protocol(format!("malformed shallow line {text:?}: {err}")))?;
            match kind {
                "shallow" => fetched.shallow.insert(oid),
                "unshallow" => fetched.unshallow.insert(oid),
                other => return Err(Error::Protocol(format!("unexpected {other:?} line"))),
            };
        }
    }
}
