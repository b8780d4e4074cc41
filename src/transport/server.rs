//! Smart-HTTP server side of `git-upload-pack`
//!
//! Two endpoints per vault:
//!
//! - `GET /<vault>/info/refs?service=git-upload-pack` advertises refs
//! - `POST /<vault>/git-upload-pack` answers with `NAK` and the pack
//!
//! Errors raised before the response starts become a status code with a
//! plain text body. Once the pack is streaming, failures are reported on
//! side-band 3 so the client can tell a broken pack from a finished one.

use crate::areas::repository::Repository;
use crate::areas::vault::Vault;
use crate::areas::vault_manager::VaultManager;
use crate::artifacts::pack::builder::{PackBuilder, PackPlan};
use crate::artifacts::protocol::capabilities::Capabilities;
use crate::artifacts::protocol::pkt_line::{encode_pkt_line, flush_pkt};
use crate::artifacts::protocol::side_band::{Progress, mux};
use crate::artifacts::protocol::{
    ADVERTISEMENT_CONTENT_TYPE, ProtocolConfig, RESULT_CONTENT_TYPE, UPLOAD_PACK_SERVICE,
};
use crate::errors::{Error, Result};
use crate::transport::advertisement::RefAdvertisement;
use crate::transport::request::{GitRequest, GitResponse};
use crate::transport::upload_pack::UploadPackRequest;
use bytes::{BufMut, Bytes, BytesMut};
use http::{Method, StatusCode};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Buffer size of the pipes between pack writer, multiplexer and response
const PIPE_CAPACITY: usize = 64 * 1024;

/// Decides whether a requester may read a vault
pub trait AccessControl: Send + Sync + std::fmt::Debug {
    fn can_access(&self, vault: &str, requester: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn can_access(&self, _vault: &str, _requester: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct GitServer {
    manager: Arc<VaultManager>,
    access: Arc<dyn AccessControl>,
    protocol: ProtocolConfig,
}

impl GitServer {
    pub fn new(
        manager: Arc<VaultManager>,
        access: Arc<dyn AccessControl>,
        protocol: ProtocolConfig,
    ) -> Self {
        GitServer {
            manager,
            access,
            protocol,
        }
    }

    pub async fn handle(&self, request: GitRequest) -> GitResponse {
        debug!(
            method = %request.method,
            path = %request.path,
            requester = %request.requester,
            "git request"
        );

        match self.route(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "git request failed");
                GitResponse::from_error(&err)
            }
        }
    }

    async fn route(&self, request: GitRequest) -> Result<GitResponse> {
        if request.path.split('/').any(|segment| segment.contains("..")) {
            return Err(Error::Protocol(format!(
                "path {} leaves the vault root",
                request.path
            )));
        }

        let path = request.path.trim_matches('/').to_string();
        let segments = path.split('/').collect::<Vec<_>>();
        match segments.as_slice() {
            [vault, "info", "refs"] => {
                if request.method != Method::GET {
                    return Ok(method_not_allowed());
                }
                let service = request
                    .query_param("service")
                    .ok_or_else(|| Error::Protocol("missing service parameter".to_string()))?;
                if service != UPLOAD_PACK_SERVICE {
                    return Err(Error::UnsupportedService(service.to_string()));
                }

                let vault = self.authorize(vault, &request.requester).await?;
                self.advertise_refs(&vault).await
            }
            [vault, "git-upload-pack"] => {
                if request.method != Method::POST {
                    return Ok(method_not_allowed());
                }
                let vault = self.authorize(vault, &request.requester).await?;
                let upload = UploadPackRequest::parse(request.body)?;
                self.upload_pack(&vault, upload).await
            }
            [_, service] if service.starts_with("git-") => {
                Err(Error::UnsupportedService(service.to_string()))
            }
            _ => Ok(GitResponse::text(StatusCode::NOT_FOUND, "not found\n")),
        }
    }

    async fn authorize(&self, vault: &str, requester: &str) -> Result<Arc<Vault>> {
        if !self.access.can_access(vault, requester) {
            return Err(Error::AccessDenied {
                vault: vault.to_string(),
                requester: requester.to_string(),
            });
        }

        self.manager.open_vault(vault).await
    }

    async fn advertise_refs(&self, vault: &Vault) -> Result<GitResponse> {
        let max_ref_depth = self.protocol.max_ref_depth;
        let (refs, head_target) = vault
            .with_repository(|repository| async move {
                let refs = repository.refs().advertised_refs(max_ref_depth).await?;
                let head_target = repository.refs().head_target().await?;
                Ok((refs, head_target))
            })
            .await?;

        let advertisement = RefAdvertisement {
            refs,
            capabilities: self.protocol.advertised(head_target.as_deref()),
        };
        debug!(vault = vault.id(), refs = advertisement.refs.len(), "advertising refs");

        Ok(GitResponse::full(
            ADVERTISEMENT_CONTENT_TYPE,
            advertisement.encode()?,
        ))
    }

    async fn upload_pack(&self, vault: &Vault, request: UploadPackRequest) -> Result<GitResponse> {
        let max_tree_depth = self.protocol.max_tree_depth;
        let planned = request.clone();
        let (repository, plan) = vault
            .with_repository(|repository| async move {
                let plan = PackBuilder::new(repository.database())
                    .depth(planned.depth)
                    .since(planned.since)
                    .shallow(planned.shallow)
                    .max_tree_depth(max_tree_depth)
                    .collect(&planned.wants, &planned.haves)
                    .await?;
                Ok((repository, plan))
            })
            .await?;

        info!(
            vault = vault.id(),
            wants = request.wants.len(),
            objects = plan.len(),
            "serving pack"
        );

        let preamble = Self::preamble(&request, &plan)?;
        let flags = request.capabilities.flags;
        let (pack_writer, pack_reader) = tokio::io::duplex(PIPE_CAPACITY);

        if !flags.contains(Capabilities::SIDE_BAND_64K) {
            let (progress, _) = mpsc::channel(1);
            tokio::spawn(write_pack(repository, plan, max_tree_depth, pack_writer, progress, false));
            return Ok(GitResponse::stream(
                RESULT_CONTENT_TYPE,
                std::io::Cursor::new(preamble).chain(pack_reader),
            ));
        }

        let report_progress = !flags.contains(Capabilities::NO_PROGRESS);
        let (progress, progress_receiver) = mpsc::channel(16);
        let (out_writer, out_reader) = tokio::io::duplex(PIPE_CAPACITY);

        tokio::spawn(write_pack(
            repository,
            plan,
            max_tree_depth,
            pack_writer,
            progress,
            report_progress,
        ));
        tokio::spawn(async move {
            if let Err(err) = mux(pack_reader, progress_receiver, out_writer).await {
                warn!(error = %err, "side-band stream aborted");
            }
        });

        Ok(GitResponse::stream(
            RESULT_CONTENT_TYPE,
            std::io::Cursor::new(preamble).chain(out_reader),
        ))
    }

    /// Shallow section when the client deepened, then `NAK`
    fn preamble(request: &UploadPackRequest, plan: &PackPlan) -> Result<Bytes> {
        let mut buffer = BytesMut::new();

        if request.is_deepening() {
            for oid in &plan.history.shallow {
                encode_pkt_line(&mut buffer, format!("shallow {oid}\n").as_bytes())?;
            }
            for oid in &plan.history.unshallow {
                encode_pkt_line(&mut buffer, format!("unshallow {oid}\n").as_bytes())?;
            }
            buffer.put_slice(&flush_pkt());
        }
        encode_pkt_line(&mut buffer, b"NAK\n")?;

        Ok(buffer.freeze())
    }
}

fn method_not_allowed() -> GitResponse {
    GitResponse::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n")
}

async fn write_pack(
    repository: Repository,
    plan: PackPlan,
    max_tree_depth: usize,
    mut writer: DuplexStream,
    progress: mpsc::Sender<Progress>,
    report_progress: bool,
) {
    if report_progress {
        let message = format!("Enumerating objects: {}, done.\n", plan.len());
        let _ = progress.send(Progress::Message(message)).await;
    }

    let builder = PackBuilder::new(repository.database()).max_tree_depth(max_tree_depth);
    match builder.write(&plan, &mut writer).await {
        Ok(_) if report_progress => {
            let message = format!("Total {} (delta 0), reused 0 (delta 0)\n", plan.len());
            let _ = progress.send(Progress::Message(message)).await;
        }
        Ok(_) => {}
        Err(err) => {
            warn!(error = %err, "pack generation failed mid-stream");
            let _ = progress.send(Progress::Fatal(format!("{err}\n"))).await;
        }
    }
}
