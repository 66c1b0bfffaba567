//! Controller-facing RPC surface

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::error::BrokerResult;
use async_trait::async_trait;
use halo_transport::{Request, Response, RpcHandler, RpcServer, TcpConnector, TransportConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
impl RpcHandler for Broker {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Run(run) => match self.run(run).await {
                Ok(report) => Response::Completed(report),
                Err(e) => {
                    warn!(error = %e, "Run failed");
                    Response::failed(e.to_string())
                }
            },
            Request::Status => Response::Status(self.status()),
            Request::TogglePause => {
                let (paused, turn) = self.toggle_pause().await;
                Response::PauseState { paused, turn }
            }
            Request::Background => {
                self.background().await;
                Response::Ack
            }
            Request::Kill => {
                self.kill().await;
                Response::Ack
            }
            other => Response::failed(format!("the broker does not serve {}", other.name())),
        }
    }
}

/// Bind `config.listen` and serve controllers until killed
pub async fn serve(config: BrokerConfig, transport: TransportConfig) -> BrokerResult<()> {
    let server = RpcServer::bind(&config.listen, transport.clone()).await?;
    let broker = Broker::new(config, Arc::new(TcpConnector::new(transport)))?;
    serve_on(server, broker).await
}

/// Serve `broker` on an already bound server until killed
pub async fn serve_on(server: RpcServer, broker: Broker) -> BrokerResult<()> {
    info!(addr = %server.local_addr()?, workers = broker.workers(), "Broker starting");
    let shutdown = broker.shutdown_signal();
    server.serve(Arc::new(broker), shutdown).await?;
    Ok(())
}
