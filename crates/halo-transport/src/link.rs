//! Connection seam between the broker and its workers
//!
//! The broker only ever talks to a worker through [`WorkerLink`] and only
//! ever dials through [`Connector`], so tests can swap the TCP client for an
//! in-process fleet.

use crate::client::RpcClient;
use crate::config::TransportConfig;
use crate::error::TransportResult;
use crate::messages::{Request, Response};
use async_trait::async_trait;
use std::sync::Arc;

/// An established connection to one worker
#[async_trait]
pub trait WorkerLink: Send + Sync {
    /// Send a request and wait for its response
    async fn call(&self, request: Request) -> TransportResult<Response>;

    /// Address of the worker this link points at
    fn endpoint(&self) -> &str;
}

/// Dials workers
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new link to `endpoint`
    async fn connect(&self, endpoint: &str) -> TransportResult<Arc<dyn WorkerLink>>;
}

#[async_trait]
impl WorkerLink for RpcClient {
    async fn call(&self, request: Request) -> TransportResult<Response> {
        RpcClient::call(self, request).await
    }

    fn endpoint(&self) -> &str {
        RpcClient::endpoint(self)
    }
}

/// Dials workers over TCP
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: TransportConfig,
}

impl TcpConnector {
    /// Create a connector using `config` for every dial
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &str) -> TransportResult<Arc<dyn WorkerLink>> {
        let client = RpcClient::connect(endpoint, &self.config).await?;
        Ok(Arc::new(client))
    }
}
