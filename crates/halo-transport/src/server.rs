//! RPC server
//!
//! Each accepted connection gets its own task, and each request on a
//! connection is handled on its own task. A long-running request (a worker's
//! `Evolve` held at a paused gate) therefore never blocks the `SetPaused` that
//! releases it.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::frame::{read_frame, write_frame};
use crate::messages::{Envelope, Request, Response};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Serves requests arriving on an [`RpcServer`]
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Answer one request
    async fn handle(&self, request: Request) -> Response;
}

/// Listening end of the RPC transport
pub struct RpcServer {
    listener: TcpListener,
    config: TransportConfig,
}

impl RpcServer {
    /// Bind to `addr`
    pub async fn bind(addr: &str, config: TransportConfig) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::connect(addr, e))?;
        Ok(Self { listener, config })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` turns true
    ///
    /// Open connections and in-flight requests are dropped on shutdown.
    pub async fn serve<H: RpcHandler>(
        self,
        handler: Arc<H>,
        mut shutdown: watch::Receiver<bool>,
    ) -> TransportResult<()> {
        let local = self.local_addr()?;
        info!(addr = %local, "RPC server listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                changed = shutdown.wait_for(|stop| *stop) => {
                    if changed.is_err() {
                        debug!(addr = %local, "Shutdown channel dropped");
                    }
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(addr = %local, peer = %peer, "Accepted connection");
                            let handler = handler.clone();
                            let max_frame_bytes = self.config.max_frame_bytes;
                            connections.spawn(serve_connection(stream, peer, handler, max_frame_bytes));
                        }
                        Err(e) => {
                            warn!(addr = %local, error = %e, "Accept failed");
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        info!(addr = %local, "RPC server stopped");
        Ok(())
    }
}

async fn serve_connection<H: RpcHandler>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    max_frame_bytes: usize,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %peer, error = %e, "Could not set TCP_NODELAY");
    }
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let endpoint = peer.to_string();
    let mut requests = JoinSet::new();

    loop {
        let envelope: Envelope<Request> = match read_frame(&mut reader, max_frame_bytes, &endpoint).await {
            Ok(envelope) => envelope,
            Err(TransportError::Closed { .. }) => {
                debug!(peer = %peer, "Peer disconnected");
                break;
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping connection");
                break;
            }
        };

        debug!(peer = %peer, id = envelope.id, request = envelope.body.name(), "Request received");
        let handler = handler.clone();
        let writer = writer.clone();
        requests.spawn(async move {
            let Envelope { id, body } = envelope;
            let response = handler.handle(body).await;
            reply(&writer, id, response, max_frame_bytes, peer).await;
        });

        // Reap finished request tasks so the set does not grow without bound
        while requests.try_join_next().is_some() {}
    }

    // Let requests that were already accepted finish answering
    while requests.join_next().await.is_some() {}
}

async fn reply(
    writer: &Mutex<OwnedWriteHalf>,
    id: u64,
    response: Response,
    max_frame_bytes: usize,
    peer: SocketAddr,
) {
    let envelope = Envelope { id, body: response };
    let mut writer = writer.lock().await;
    if let Err(e) = write_frame(&mut *writer, &envelope, max_frame_bytes).await {
        warn!(peer = %peer, id, error = %e, "Failed to send response");
    }
}
