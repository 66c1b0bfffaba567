//! Multiplexed RPC client
//!
//! Requests carry ids and a background reader task routes each response to
//! whoever is waiting for that id, so several calls can be outstanding on one
//! connection at once. A caller that gives up drops its slot; a response that
//! arrives for it later is discarded.

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::frame::{read_frame, write_frame};
use crate::messages::{Envelope, Request, Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type PendingCalls = HashMap<u64, oneshot::Sender<Response>>;

/// Calls waiting for a response, plus whether the connection is gone
#[derive(Default)]
struct Pending {
    calls: Mutex<PendingCalls>,
    closed: AtomicBool,
}

impl Pending {
    /// Register a call; fails once the connection has closed
    fn register(&self, id: u64, tx: oneshot::Sender<Response>) -> bool {
        let mut calls = self.calls.lock();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        calls.insert(id, tx);
        true
    }

    /// Mark closed and fail every waiting call
    fn close(&self) {
        let mut calls = self.calls.lock();
        self.closed.store(true, Ordering::SeqCst);
        calls.clear();
    }
}

/// Removes a call's slot when the caller stops waiting
struct PendingGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.calls.lock().remove(&self.id);
    }
}

/// Client end of one RPC connection
pub struct RpcClient {
    endpoint: String,
    writer: AsyncMutex<OwnedWriteHalf>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    max_frame_bytes: usize,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Dial `endpoint`
    pub async fn connect(endpoint: &str, config: &TransportConfig) -> TransportResult<Self> {
        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(endpoint))
            .await
            .map_err(|_| TransportError::timeout(format!("connect to {endpoint}"), config.connect_timeout()))?
            .map_err(|e| TransportError::connect(endpoint, e))?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let pending = Arc::new(Pending::default());
        let reader = tokio::spawn(Self::read_loop(
            read_half,
            pending.clone(),
            endpoint.to_string(),
            config.max_frame_bytes,
        ));

        info!(endpoint = %endpoint, "RPC client connected");
        Ok(Self {
            endpoint: endpoint.to_string(),
            writer: AsyncMutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            max_frame_bytes: config.max_frame_bytes,
            reader,
        })
    }

    /// Route responses to waiting callers until the connection fails
    async fn read_loop(
        mut reader: OwnedReadHalf,
        pending: Arc<Pending>,
        endpoint: String,
        max_frame_bytes: usize,
    ) {
        loop {
            match read_frame::<_, Envelope<Response>>(&mut reader, max_frame_bytes, &endpoint).await {
                Ok(envelope) => {
                    let waiter = pending.calls.lock().remove(&envelope.id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(envelope.body);
                        }
                        None => {
                            debug!(
                                endpoint = %endpoint,
                                id = envelope.id,
                                response = envelope.body.name(),
                                "Discarding response nobody is waiting for"
                            );
                        }
                    }
                }
                Err(TransportError::Closed { .. }) => {
                    debug!(endpoint = %endpoint, "RPC connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "RPC connection failed");
                    break;
                }
            }
        }
        pending.close();
    }

    /// Remote address
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the connection has failed
    pub fn is_closed(&self) -> bool {
        self.pending.closed.load(Ordering::SeqCst)
    }

    /// Send `request` and wait for its response
    pub async fn call(&self, request: Request) -> TransportResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if !self.pending.register(id, tx) {
            return Err(TransportError::closed(&self.endpoint));
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        {
            let mut writer = self.writer.lock().await;
            let envelope = Envelope { id, body: request };
            if let Err(e) = write_frame(&mut *writer, &envelope, self.max_frame_bytes).await {
                if !matches!(e, TransportError::FrameTooLarge { .. } | TransportError::Codec(_)) {
                    self.pending.close();
                }
                return Err(e);
            }
        }

        rx.await.map_err(|_| TransportError::closed(&self.endpoint))
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}
