//! Error types shared across the crate
//!
//! Codecs work with `anyhow` internally (the way object parsing always has);
//! everything that crosses a component boundary is mapped onto [`Error`] so
//! callers can match on the failure class.

use crate::artifacts::objects::object_id::ObjectId;
use http::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object {oid} not found")]
    ObjectNotFound { oid: ObjectId },

    #[error("object {oid} is corrupt: {reason}")]
    ObjectCorrupt { oid: ObjectId, reason: String },

    #[error("packfile is corrupt: {0}")]
    PackCorrupt(String),

    #[error("pkt-line stream is corrupt: {0}")]
    PktLineCorrupt(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("unsupported service: {0}")]
    UnsupportedService(String),

    #[error("vault {name} does not exist")]
    VaultUndefined { name: String },

    #[error("vault {name} already exists")]
    VaultDefined { name: String },

    #[error("invalid vault name: {0}")]
    InvalidVaultName(String),

    #[error("vault is not running")]
    VaultNotRunning,

    #[error("vault is still running")]
    VaultRunning,

    #[error("vault has been destroyed")]
    VaultDestroyed,

    #[error("vault tracks a remote and can only be updated by pulling")]
    VaultRemoteDefined,

    #[error("reference {reference} does not point to a commit")]
    VaultReferenceInvalid { reference: String },

    #[error("resolving reference {reference} exceeded the maximum depth")]
    ReferenceResolutionDepthExceeded { reference: String },

    #[error("secret {path} does not exist")]
    SecretUndefined { path: String },

    #[error("secret {path} already exists")]
    SecretDefined { path: String },

    #[error("{requester} may not access vault {vault}")]
    AccessDenied { vault: String, requester: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn corrupt(oid: &ObjectId, reason: impl std::fmt::Display) -> Self {
        Error::ObjectCorrupt {
            oid: oid.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ObjectNotFound { .. }
            | Error::VaultUndefined { .. }
            | Error::SecretUndefined { .. } => true,
            Error::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Status code used when the error ends a request before any body was sent.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::ObjectNotFound { .. }
            | Error::VaultUndefined { .. }
            | Error::SecretUndefined { .. } => StatusCode::NOT_FOUND,
            Error::UnsupportedService(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::Protocol(_)
            | Error::PktLineCorrupt(_)
            | Error::InvalidVaultName(_)
            | Error::VaultReferenceInvalid { .. } => StatusCode::BAD_REQUEST,
            Error::AccessDenied { .. } => StatusCode::FORBIDDEN,
            Error::VaultNotRunning | Error::VaultDestroyed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub(crate) fn not_found(path: impl std::fmt::Display) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no such file or directory: {path}"),
    ))
}
