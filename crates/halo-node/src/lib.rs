//! Halo Node
//!
//! A worker in the halo fleet. It receives one haloed strip per turn from the
//! broker, computes the next generation, and answers the broker's pause,
//! background, status and kill commands.

pub mod config;
pub mod service;

pub use config::NodeConfig;
pub use service::NodeService;

use halo_transport::{RpcServer, TransportConfig, TransportResult};
use std::sync::Arc;
use tracing::info;

/// Bind `config.listen` and serve until the node is killed
pub async fn serve(config: &NodeConfig, transport: TransportConfig) -> TransportResult<()> {
    let server = RpcServer::bind(&config.listen, transport).await?;
    serve_on(server, Arc::new(NodeService::new(config))).await
}

/// Serve `node` on an already bound server until it is killed
pub async fn serve_on(server: RpcServer, node: Arc<NodeService>) -> TransportResult<()> {
    info!(addr = %server.local_addr()?, "Worker node starting");
    let shutdown = node.shutdown_signal();
    server.serve(node, shutdown).await
}
