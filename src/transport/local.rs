use crate::errors::Result;
use crate::transport::client::GitTransport;
use crate::transport::request::{GitRequest, GitResponse};
use crate::transport::server::GitServer;
use async_trait::async_trait;

/// Hands requests straight to a server in the same process
#[derive(Debug, Clone)]
pub struct LocalTransport {
    server: GitServer,
}

impl LocalTransport {
    pub fn new(server: GitServer) -> Self {
        LocalTransport { server }
    }
}

#[async_trait]
impl GitTransport for LocalTransport {
    async fn send(&self, request: GitRequest) -> Result<GitResponse> {
        Ok(self.server.handle(request).await)
    }
}
