//! Worker request handling
//!
//! A node keeps the last strip it computed together with the turn that strip
//! represents. The broker drives it one turn at a time with `Evolve` and can
//! pause it at any point; a paused node still finishes the turn it is on but
//! holds the response until released.

use crate::config::NodeConfig;
use async_trait::async_trait;
use halo_core::{life, Grid, PauseGate, PauseStatus};
use halo_transport::{EvolveRequest, EvolveResponse, Request, Response, RpcHandler, StatusReport};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Last computed strip
#[derive(Debug, Clone, PartialEq, Eq)]
struct Snapshot {
    world: Grid,
    turn: u64,
}

/// One worker's state and request handlers
pub struct NodeService {
    gate: PauseGate,
    snapshot: RwLock<Option<Snapshot>>,
    /// Held for the whole of a local turn
    compute: Mutex<()>,
    shutdown: watch::Sender<bool>,
    kill_grace: Duration,
}

impl NodeService {
    /// Create a node in the running state
    pub fn new(config: &NodeConfig) -> Self {
        let (shutdown, _rx) = watch::channel(false);
        Self {
            gate: PauseGate::new(),
            snapshot: RwLock::new(None),
            compute: Mutex::new(()),
            shutdown,
            kill_grace: config.kill_grace(),
        }
    }

    /// Receiver that turns true once the node has been killed
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Whether the node has been killed
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Gate status
    pub fn status(&self) -> PauseStatus {
        self.gate.status()
    }

    /// Turn of the last computed strip, 0 before the first
    pub fn turn(&self) -> u64 {
        self.snapshot.read().as_ref().map_or(0, |snapshot| snapshot.turn)
    }

    /// Compute one local turn
    pub async fn evolve(&self, request: EvolveRequest) -> Result<EvolveResponse, String> {
        let EvolveRequest { world, params, turn } = request;
        if world.height() != params.image_height || world.width() != params.image_width {
            return Err(format!(
                "strip is {}x{} but params say {}x{}",
                world.width(),
                world.height(),
                params.image_width,
                params.image_height
            ));
        }
        let target = turn + 1;

        if self.gate.is_paused() {
            // A paused node receiving work means the broker is resuming
            info!(turn, "Evolve while paused, resuming");
            self.gate.release();
            let _guard = self.compute.lock().await;
            if let Some(snapshot) = self.stable_snapshot(target, &world) {
                debug!(turn = target, "Returning completed strip without recomputing");
                return Ok(respond(snapshot));
            }
        }

        let guard = self.compute.lock().await;
        let next = tokio::task::spawn_blocking(move || life::step(&world))
            .await
            .map_err(|e| format!("strip computation failed: {e}"))?;
        let snapshot = Snapshot {
            world: next,
            turn: target,
        };
        *self.snapshot.write() = Some(snapshot.clone());
        drop(guard);
        debug!(turn = target, alive = snapshot.world.alive_count(), "Computed strip");

        // A pause that arrived mid-turn holds the answer back
        self.gate.wait_until_running().await;
        Ok(respond(snapshot))
    }

    fn stable_snapshot(&self, target: u64, world: &Grid) -> Option<Snapshot> {
        self.snapshot
            .read()
            .as_ref()
            .filter(|snapshot| {
                snapshot.turn == target
                    && snapshot.world.width() == world.width()
                    && snapshot.world.height() == world.height()
            })
            .cloned()
    }

    /// Set the pause state; repeating the current state is a no-op
    pub fn set_paused(&self, paused: bool) -> (bool, u64) {
        let changed = if paused {
            self.gate.pause()
        } else {
            self.gate.release()
        };
        let turn = self.turn();
        if changed {
            info!(paused, turn, "Pause state changed");
        } else {
            debug!(paused, turn, "Pause state unchanged");
        }
        (self.gate.is_paused(), turn)
    }

    /// Pause and hold state until a broker reattaches
    pub fn background(&self) {
        if self.gate.pause() {
            info!(turn = self.turn(), "Backgrounded");
        }
    }

    /// Local snapshot
    pub fn report(&self) -> StatusReport {
        let snapshot = self.snapshot.read().clone();
        let (world, turn) = match snapshot {
            Some(snapshot) => (snapshot.world, snapshot.turn),
            None => (Grid::dead(0, 0), 0),
        };
        StatusReport {
            alive_cells: world.alive_count(),
            world,
            turn,
            status: self.gate.status(),
        }
    }

    /// Signal shutdown after the kill grace period
    pub fn kill(&self) {
        info!("Kill received, shutting down");
        let shutdown = self.shutdown.clone();
        let grace = self.kill_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            shutdown.send_replace(true);
        });
    }
}

fn respond(snapshot: Snapshot) -> EvolveResponse {
    EvolveResponse {
        alive_cells: snapshot.world.alive_count(),
        world: snapshot.world,
        turn: snapshot.turn,
    }
}

#[async_trait]
impl RpcHandler for NodeService {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Evolve(request) => match self.evolve(request).await {
                Ok(response) => Response::Evolved(response),
                Err(message) => {
                    warn!(error = %message, "Rejecting evolve");
                    Response::failed(message)
                }
            },
            Request::SetPaused { paused } => {
                let (paused, turn) = self.set_paused(paused);
                Response::PauseState { paused, turn }
            }
            Request::Background => {
                self.background();
                Response::Ack
            }
            Request::Status => Response::Status(self.report()),
            Request::Kill => {
                self.kill();
                Response::Ack
            }
            other => Response::failed(format!("workers do not serve {}", other.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::Params;
    use std::sync::Arc;

    fn blinker_request(turn: u64) -> EvolveRequest {
        let world = Grid::with_live_cells(5, 5, &[(1, 2), (2, 2), (3, 2)]);
        EvolveRequest {
            params: Params::new(5, 5, 10),
            world,
            turn,
        }
    }

    #[tokio::test]
    async fn test_evolve_computes_next_turn() {
        let node = NodeService::new(&NodeConfig::default());
        let response = node.evolve(blinker_request(3)).await.unwrap();
        assert_eq!(response.turn, 4);
        assert_eq!(response.alive_cells, 3);
        assert_eq!(response.world, Grid::with_live_cells(5, 5, &[(2, 1), (2, 2), (2, 3)]));
        assert_eq!(node.turn(), 4);
    }

    #[tokio::test]
    async fn test_set_paused_is_idempotent() {
        let node = NodeService::new(&NodeConfig::default());
        assert_eq!(node.set_paused(true), (true, 0));
        assert_eq!(node.set_paused(true), (true, 0));
        assert_eq!(node.status(), PauseStatus::Paused);
        assert_eq!(node.set_paused(false), (false, 0));
        assert_eq!(node.set_paused(false), (false, 0));
    }

    #[tokio::test]
    async fn test_resume_returns_stable_snapshot() {
        let node = NodeService::new(&NodeConfig::default());
        let first = node.evolve(blinker_request(0)).await.unwrap();

        // Broker paused us after turn 0 and now resends turn 0 with a
        // different strip; the completed strip must come back unchanged
        node.background();
        let mut resend = blinker_request(0);
        resend.world = Grid::dead(5, 5);
        let resumed = node.evolve(resend).await.unwrap();

        assert_eq!(resumed, first);
        assert_eq!(node.status(), PauseStatus::Running);
    }

    #[tokio::test]
    async fn test_resume_for_new_turn_recomputes() {
        let node = NodeService::new(&NodeConfig::default());
        node.evolve(blinker_request(0)).await.unwrap();
        node.set_paused(true);

        let mut next = blinker_request(1);
        next.world = Grid::dead(5, 5);
        let response = node.evolve(next).await.unwrap();
        assert_eq!(response.turn, 2);
        assert_eq!(response.alive_cells, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_holds_response_back() {
        let node = Arc::new(NodeService::new(&NodeConfig::default()));
        // Take the compute lock so the evolve below is stuck mid-turn
        let guard = node.compute.lock().await;

        let pending = {
            let node = node.clone();
            tokio::spawn(async move { node.evolve(blinker_request(0)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        node.set_paused(true);
        drop(guard);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert_eq!(node.turn(), 1);

        node.set_paused(false);
        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.turn, 1);
    }

    #[tokio::test]
    async fn test_mismatched_strip_is_rejected() {
        let node = NodeService::new(&NodeConfig::default());
        let mut request = blinker_request(0);
        request.params = request.params.with_local_height(7);
        let response = node.handle(Request::Evolve(request)).await;
        assert!(matches!(response, Response::Failed { .. }));
    }

    #[tokio::test]
    async fn test_kill_signals_shutdown() {
        let config = NodeConfig {
            kill_grace_ms: 1,
            ..NodeConfig::default()
        };
        let node = NodeService::new(&config);
        let mut signal = node.shutdown_signal();

        assert_eq!(node.handle(Request::Kill).await, Response::Ack);
        signal.wait_for(|stop| *stop).await.unwrap();
        assert!(node.is_shut_down());
    }

    #[tokio::test]
    async fn test_broker_only_requests_fail() {
        let node = NodeService::new(&NodeConfig::default());
        assert!(matches!(node.handle(Request::TogglePause).await, Response::Failed { .. }));
    }
}
