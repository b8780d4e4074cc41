use crate::errors::{Error, Result};
use bytes::Bytes;
use http::{Method, StatusCode};
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};

/// An HTTP request addressed to a vault's git endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRequest {
    pub method: Method,
    /// `/<vault>/info/refs` or `/<vault>/git-upload-pack`
    pub path: String,
    pub query: Option<String>,
    /// Identity checked against the vault's access control
    pub requester: String,
    pub body: Bytes,
}

impl GitRequest {
    pub fn discover_refs(vault: &str, service: &str, requester: &str) -> Self {
        GitRequest {
            method: Method::GET,
            path: format!("/{vault}/info/refs"),
            query: Some(format!("service={service}")),
            requester: requester.to_string(),
            body: Bytes::new(),
        }
    }

    pub fn upload_pack(vault: &str, requester: &str, body: Bytes) -> Self {
        GitRequest {
            method: Method::POST,
            path: format!("/{vault}/git-upload-pack"),
            query: None,
            requester: requester.to_string(),
            body,
        }
    }

    /// Value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .as_deref()?
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find_map(|(key, value)| (key == name).then_some(value))
    }
}

pub enum ResponseBody {
    Full(Bytes),
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug)]
pub struct GitResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: ResponseBody,
}

impl GitResponse {
    pub fn full(content_type: &str, body: Bytes) -> Self {
        GitResponse {
            status: StatusCode::OK,
            content_type: content_type.to_string(),
            body: ResponseBody::Full(body),
        }
    }

    pub fn stream(content_type: &str, body: impl AsyncRead + Send + 'static) -> Self {
        GitResponse {
            status: StatusCode::OK,
            content_type: content_type.to_string(),
            body: ResponseBody::Stream(Box::pin(body)),
        }
    }

    pub fn text(status: StatusCode, message: impl Into<String>) -> Self {
        GitResponse {
            status,
            content_type: "text/plain".to_string(),
            body: ResponseBody::Full(Bytes::from(message.into())),
        }
    }

    /// Plain text response for an error raised before any body was sent
    pub fn from_error(err: &Error) -> Self {
        Self::text(err.http_status(), format!("{err}\n"))
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Read the whole body into memory
    pub async fn into_bytes(self) -> Result<Bytes> {
        match self.body {
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::Stream(mut reader) => {
                let mut buffer = Vec::new();
                reader.read_to_end(&mut buffer).await?;
                Ok(buffer.into())
            }
        }
    }
}
