//! Fault-tolerant worker call
//!
//! A worker call either completes or, when the connection fails, pauses the
//! other workers, redials the failed one and reports [`CallOutcome::Resend`]
//! so the caller can retry the whole round from committed state. Only an
//! exhausted reconnect budget turns a transport failure into an error.

use crate::error::{BrokerError, BrokerResult};
use crate::table::WorkerTable;
use futures::future::join_all;
use halo_transport::{Connector, ReconnectConfig, Request, Response, TransportError, TransportResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a call that survived its transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The worker answered
    Completed(Response),
    /// The connection failed and was replaced; retry the round
    Resend,
}

/// Worker calls with recovery
pub struct FaultTolerantCall {
    table: Arc<WorkerTable>,
    connector: Arc<dyn Connector>,
    policy: ReconnectConfig,
    broadcast_timeout: Duration,
}

impl FaultTolerantCall {
    /// Create calls over `table`, redialling through `connector`
    pub fn new(
        table: Arc<WorkerTable>,
        connector: Arc<dyn Connector>,
        policy: ReconnectConfig,
        broadcast_timeout: Duration,
    ) -> Self {
        Self {
            table,
            connector,
            policy,
            broadcast_timeout,
        }
    }

    /// The worker table
    pub fn table(&self) -> &WorkerTable {
        &self.table
    }

    /// Dial every worker that has no connection
    pub async fn connect_all(&self) -> BrokerResult<()> {
        self.table.connect_missing(self.connector.as_ref(), &self.policy).await
    }

    /// Call worker `index`, recovering from transport failure
    pub async fn call(&self, index: usize, request: Request) -> BrokerResult<CallOutcome> {
        let name = request.name();
        let (result, generation) = self.call_once(index, request).await;
        match result {
            Ok(Response::Failed { message }) => Err(BrokerError::Remote { index, message }),
            Ok(response) => Ok(CallOutcome::Completed(response)),
            Err(e) => {
                warn!(worker = index, request = name, error = %e, "Worker call failed, recovering");
                self.pause_others(index).await;
                self.recover(index, generation).await?;
                Ok(CallOutcome::Resend)
            }
        }
    }

    /// One attempt on the current connection, with no recovery
    ///
    /// Also returns the generation of the connection used, for [`Self::recover`].
    pub async fn call_once(&self, index: usize, request: Request) -> (TransportResult<Response>, u64) {
        let slot = self.table.slot(index);
        let (link, generation) = slot.current();
        let result = match link {
            Some(link) => link.call(request).await,
            None => Err(TransportError::NotConnected {
                endpoint: slot.endpoint().to_string(),
            }),
        };
        (result, generation)
    }

    /// Redial worker `index` if its connection is still generation `generation`
    pub async fn recover(&self, index: usize, generation: u64) -> BrokerResult<()> {
        self.table
            .slot(index)
            .redial(generation, self.connector.as_ref(), &self.policy)
            .await
    }

    /// Tell every worker except `failed` to pause; failures are only logged
    pub async fn pause_others(&self, failed: usize) {
        let others = (0..self.table.len()).filter(|&index| index != failed);
        self.broadcast_to(others, Request::SetPaused { paused: true }).await;
    }

    /// Send `request` to every worker, single attempt each, bounded by the
    /// broadcast timeout; returns each worker's answer if it arrived in time
    pub async fn broadcast(&self, request: Request) -> Vec<Option<Response>> {
        self.broadcast_to(0..self.table.len(), request).await
    }

    async fn broadcast_to(
        &self,
        indices: impl Iterator<Item = usize>,
        request: Request,
    ) -> Vec<Option<Response>> {
        let name = request.name();
        let calls = indices.map(|index| {
            let request = request.clone();
            async move {
                match tokio::time::timeout(self.broadcast_timeout, self.call_once(index, request)).await {
                    Ok((Ok(response), _)) => {
                        debug!(worker = index, request = name, response = response.name(), "Broadcast delivered");
                        Some(response)
                    }
                    Ok((Err(TransportError::NotConnected { .. }), _)) => {
                        debug!(worker = index, request = name, "Broadcast skipped, worker never connected");
                        None
                    }
                    Ok((Err(e), _)) => {
                        warn!(worker = index, request = name, error = %e, "Broadcast failed");
                        None
                    }
                    Err(_) => {
                        warn!(worker = index, request = name, "Broadcast timed out");
                        None
                    }
                }
            }
        });
        join_all(calls).await
    }
}
