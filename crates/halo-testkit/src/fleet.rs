//! In-memory worker fleet
//!
//! Every worker is a real [`NodeService`] called directly instead of over TCP.
//! Faults are injected at the link: a crashed worker's open links fail with
//! [`TransportError::Closed`], and its restart (a fresh node with no state)
//! is only reachable through a new dial.

use async_trait::async_trait;
use halo_core::PauseStatus;
use halo_node::{NodeConfig, NodeService};
use halo_transport::{
    Connector, ReconnectConfig, Request, Response, RpcHandler, TransportError, TransportResult,
    WorkerLink,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

struct Worker {
    endpoint: String,
    node: Arc<NodeService>,
    /// Bumped on every crash; links from older epochs are dead
    epoch: u64,
    restarts: u32,
    /// Dials to refuse before accepting again; `u32::MAX` refuses forever
    refuse_dials: u32,
    crash_at_turn: Option<u64>,
    /// Dials refused after the crash at `crash_at_turn` before the restarted
    /// worker accepts; `u32::MAX` means it never comes back
    downtime_dials: u32,
    dials: u32,
}

impl Worker {
    fn crash(&mut self) {
        self.node = Arc::new(NodeService::new(&node_config()));
        self.epoch += 1;
        self.restarts += 1;
    }
}

fn node_config() -> NodeConfig {
    NodeConfig {
        listen: "memory".to_string(),
        kill_grace_ms: 1,
    }
}

type Workers = Arc<Mutex<Vec<Worker>>>;

/// A fleet of in-process workers
#[derive(Clone)]
pub struct MemoryFleet {
    workers: Workers,
}

impl MemoryFleet {
    /// Start `size` workers
    pub fn new(size: usize) -> Self {
        let workers = (0..size)
            .map(|index| Worker {
                endpoint: format!("memory://worker-{index}"),
                node: Arc::new(NodeService::new(&node_config())),
                epoch: 0,
                restarts: 0,
                refuse_dials: 0,
                crash_at_turn: None,
                downtime_dials: 0,
                dials: 0,
            })
            .collect();
        Self {
            workers: Arc::new(Mutex::new(workers)),
        }
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.workers.lock().len()
    }

    /// Whether the fleet is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Worker endpoints, in slot order
    pub fn endpoints(&self) -> Vec<String> {
        self.workers.lock().iter().map(|w| w.endpoint.clone()).collect()
    }

    /// Connector that dials this fleet
    pub fn connector(&self) -> Arc<MemoryConnector> {
        Arc::new(MemoryConnector {
            workers: self.workers.clone(),
        })
    }

    /// Current node behind worker `index`
    pub fn node(&self, index: usize) -> Arc<NodeService> {
        self.workers.lock()[index].node.clone()
    }

    /// Crash and restart worker `index` when it is asked to evolve `turn`
    ///
    /// The failing call sees a closed connection; the restarted worker accepts
    /// the next dial.
    pub fn crash_at_turn(&self, index: usize, turn: u64) {
        self.crash_with_downtime(index, turn, 0);
    }

    /// Like [`Self::crash_at_turn`], but the restart refuses `refused_dials`
    /// dials before it accepts one
    pub fn crash_with_downtime(&self, index: usize, turn: u64, refused_dials: u32) {
        let mut workers = self.workers.lock();
        workers[index].crash_at_turn = Some(turn);
        workers[index].downtime_dials = refused_dials;
    }

    /// Crash worker `index` when it is asked to evolve `turn`, for good
    pub fn die_at_turn(&self, index: usize, turn: u64) {
        self.crash_with_downtime(index, turn, u32::MAX);
    }

    /// Crash worker `index` now and refuse every dial from here on
    pub fn kill_permanently(&self, index: usize) {
        let mut workers = self.workers.lock();
        workers[index].crash();
        workers[index].refuse_dials = u32::MAX;
    }

    /// Refuse the next `count` dials to worker `index`
    pub fn refuse_dials(&self, index: usize, count: u32) {
        self.workers.lock()[index].refuse_dials = count;
    }

    /// Times worker `index` has been restarted
    pub fn restarts(&self, index: usize) -> u32 {
        self.workers.lock()[index].restarts
    }

    /// Dials made to worker `index`, successful or not
    pub fn dials(&self, index: usize) -> u32 {
        self.workers.lock()[index].dials
    }

    /// Gate status of every worker
    pub fn statuses(&self) -> Vec<PauseStatus> {
        self.workers.lock().iter().map(|w| w.node.status()).collect()
    }

    /// Whether every current node has been killed
    pub fn all_shut_down(&self) -> bool {
        self.workers.lock().iter().all(|w| w.node.is_shut_down())
    }

    /// Reconnect policy fast enough for tests
    pub fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts: Some(max_attempts),
            base_delay_ms: 1,
            max_delay_ms: 4,
            multiplier: 2.0,
        }
    }
}

/// Dials workers in a [`MemoryFleet`]
pub struct MemoryConnector {
    workers: Workers,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> TransportResult<Arc<dyn WorkerLink>> {
        let mut workers = self.workers.lock();
        let index = workers
            .iter()
            .position(|w| w.endpoint == endpoint)
            .ok_or_else(|| TransportError::connect(endpoint, "no such worker"))?;
        let worker = &mut workers[index];
        worker.dials += 1;

        if worker.refuse_dials > 0 {
            if worker.refuse_dials != u32::MAX {
                worker.refuse_dials -= 1;
            }
            return Err(TransportError::connect(endpoint, "connection refused"));
        }

        debug!(worker = index, epoch = worker.epoch, "Memory link opened");
        Ok(Arc::new(MemoryLink {
            index,
            endpoint: endpoint.to_string(),
            epoch: worker.epoch,
            node: worker.node.clone(),
            workers: self.workers.clone(),
        }))
    }
}

/// Link to one in-process worker
pub struct MemoryLink {
    index: usize,
    endpoint: String,
    epoch: u64,
    node: Arc<NodeService>,
    workers: Workers,
}

impl MemoryLink {
    /// Fail if the worker crashed since this link was opened, or crash it now
    /// if this request is the one it was told to crash on
    fn check(&self, request: &Request) -> TransportResult<()> {
        let mut workers = self.workers.lock();
        let worker = &mut workers[self.index];
        if worker.epoch != self.epoch {
            return Err(TransportError::closed(&self.endpoint));
        }
        if let (Request::Evolve(evolve), Some(turn)) = (request, worker.crash_at_turn) {
            if evolve.turn == turn {
                worker.crash_at_turn = None;
                worker.crash();
                worker.refuse_dials = worker.downtime_dials;
                debug!(worker = self.index, turn, "Injected crash");
                return Err(TransportError::closed(&self.endpoint));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerLink for MemoryLink {
    async fn call(&self, request: Request) -> TransportResult<Response> {
        self.check(&request)?;
        Ok(self.node.handle(request).await)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::{Grid, Params};
    use halo_transport::EvolveRequest;

    fn evolve(turn: u64) -> Request {
        Request::Evolve(EvolveRequest {
            world: Grid::dead(3, 3),
            params: Params::new(3, 3, 5),
            turn,
        })
    }

    #[tokio::test]
    async fn test_crash_breaks_open_links() {
        let fleet = MemoryFleet::new(2);
        let connector = fleet.connector();
        let link = connector.connect("memory://worker-1").await.unwrap();
        fleet.crash_at_turn(1, 3);

        assert!(link.call(evolve(2)).await.is_ok());
        assert!(link.call(evolve(3)).await.is_err());
        assert!(link.call(Request::Status).await.is_err());
        assert_eq!(fleet.restarts(1), 1);

        let fresh = connector.connect("memory://worker-1").await.unwrap();
        assert!(fresh.call(evolve(3)).await.is_ok());
    }

    #[tokio::test]
    async fn test_refused_dials_are_counted() {
        let fleet = MemoryFleet::new(1);
        let connector = fleet.connector();
        fleet.refuse_dials(0, 2);

        assert!(connector.connect("memory://worker-0").await.is_err());
        assert!(connector.connect("memory://worker-0").await.is_err());
        assert!(connector.connect("memory://worker-0").await.is_ok());
        assert_eq!(fleet.dials(0), 3);
    }
}
