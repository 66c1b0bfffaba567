//! The broker and its control operations
//!
//! A [`Broker`] owns the worker table, the pause gate and at most one active
//! session. Control requests (toggle, background, status, kill) act on that
//! state directly; the session's round loop lives in [`crate::session`].

use crate::call::FaultTolerantCall;
use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::round::RoundExecutor;
use crate::session::{Committed, SessionHandle, SessionOutcome};
use crate::table::WorkerTable;
use halo_core::{Grid, HaloError, PauseGate, PauseStatus};
use halo_transport::{Connector, Request, RunReport, RunRequest, StatusReport};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{info, warn};

/// Delay between acknowledging `Kill` and closing the listener
const KILL_GRACE: Duration = Duration::from_millis(100);

pub(crate) struct Inner {
    pub(crate) calls: Arc<FaultTolerantCall>,
    pub(crate) executor: RoundExecutor,
    pub(crate) gate: PauseGate,
    pub(crate) committed: RwLock<Option<Committed>>,
    pub(crate) session: Mutex<Option<SessionHandle>>,
    /// Serializes pause toggles, background and resume
    pub(crate) toggle: AsyncMutex<()>,
    /// Set on kill; stops the round loop immediately
    pub(crate) halt: watch::Sender<bool>,
    /// Set shortly after kill; stops the RPC server
    pub(crate) server_stop: watch::Sender<bool>,
}

/// Orchestrates runs across the worker fleet
#[derive(Clone)]
pub struct Broker {
    pub(crate) inner: Arc<Inner>,
}

impl Broker {
    /// Create a broker that dials workers through `connector`
    pub fn new(config: BrokerConfig, connector: Arc<dyn Connector>) -> BrokerResult<Self> {
        config.validate()?;
        let table = Arc::new(WorkerTable::new(config.workers.iter().cloned()));
        let calls = Arc::new(FaultTolerantCall::new(
            table,
            connector,
            config.reconnect.clone(),
            config.kill_timeout(),
        ));
        let (halt, _) = watch::channel(false);
        let (server_stop, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                executor: RoundExecutor::new(calls.clone()),
                calls,
                gate: PauseGate::new(),
                committed: RwLock::new(None),
                session: Mutex::new(None),
                toggle: AsyncMutex::new(()),
                halt,
                server_stop,
            }),
        })
    }

    /// Number of worker slots
    pub fn workers(&self) -> usize {
        self.inner.executor.workers()
    }

    /// Gate status
    pub fn gate_status(&self) -> PauseStatus {
        self.inner.gate.status()
    }

    /// Last committed turn, 0 before any run
    pub fn turn(&self) -> u64 {
        self.inner.committed.read().as_ref().map_or(0, |committed| committed.turn)
    }

    /// Whether the broker has been killed
    pub fn is_halted(&self) -> bool {
        *self.inner.halt.borrow()
    }

    /// Receiver that turns true when the RPC server should stop
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.server_stop.subscribe()
    }

    /// Run `request` to completion, or reattach to the session already running
    ///
    /// Reattaching to a paused or backgrounded session resumes it. The call
    /// returns when the session ends, whichever caller started it.
    pub async fn run(&self, request: RunRequest) -> BrokerResult<RunReport> {
        if self.is_halted() {
            return Err(BrokerError::Shutdown);
        }

        let (mut done, reattached) = self.attach_or_start(request)?;
        if reattached {
            // Workers may be holding responses of an in-flight round
            let turn = self.turn();
            if let Err(e) = self.resume(turn).await {
                warn!(turn, error = %e, "Resume on reattach failed, round loop will retry");
            }
        }
        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => return Err(BrokerError::Shutdown),
        };
        match outcome {
            Some(Ok(report)) => Ok(report),
            Some(Err(e)) => Err(BrokerError::Session(e)),
            None => Err(BrokerError::Shutdown),
        }
    }

    /// Returns the session's completion channel and whether this resumed it
    fn attach_or_start(&self, request: RunRequest) -> BrokerResult<(watch::Receiver<Option<SessionOutcome>>, bool)> {
        let inner = &self.inner;
        let mut session = inner.session.lock();

        if let Some(active) = session.as_ref().filter(|handle| handle.is_active()) {
            let params = active.params();
            if params.image_width != request.params.image_width
                || params.image_height != request.params.image_height
            {
                return Err(BrokerError::session_conflict(format!(
                    "session {} runs a {}x{} grid, request is {}x{}",
                    active.id(),
                    params.image_width,
                    params.image_height,
                    request.params.image_width,
                    request.params.image_height
                )));
            }
            let reattached = inner.gate.transition(PauseStatus::Paused, PauseStatus::Resuming);
            if reattached {
                info!(session = %active.id(), turn = self.turn(), "Controller reattached, resuming");
            } else {
                info!(session = %active.id(), turn = self.turn(), "Controller attached to running session");
            }
            return Ok((active.subscribe(), reattached));
        }

        let RunRequest { world, params } = request;
        if world.width() != params.image_width || world.height() != params.image_height {
            return Err(HaloError::invalid_grid(format!(
                "world is {}x{} but params say {}x{}",
                world.width(),
                world.height(),
                params.image_width,
                params.image_height
            ))
            .into());
        }
        inner.executor.partition(&world)?;

        *inner.committed.write() = Some(Committed::new(world, params));
        inner.gate.set(PauseStatus::Running);

        let handle = SessionHandle::start(self.clone(), params);
        let done = handle.subscribe();
        *session = Some(handle);
        Ok((done, false))
    }

    /// Flip between paused and running; returns the new pause state and turn
    pub async fn toggle_pause(&self) -> (bool, u64) {
        let inner = &self.inner;
        let _toggle = inner.toggle.lock().await;
        let turn = self.turn();

        if inner.gate.is_paused() {
            self.broadcast(Request::SetPaused { paused: false }).await;
            inner.gate.release();
            info!(turn, "Unpaused");
            (false, turn)
        } else {
            inner.gate.pause();
            self.broadcast(Request::SetPaused { paused: true }).await;
            info!(turn, "Paused");
            (true, turn)
        }
    }

    /// Pause and hold state until a controller reattaches with `Run`
    pub async fn background(&self) {
        let inner = &self.inner;
        let _toggle = inner.toggle.lock().await;
        inner.gate.pause();
        self.broadcast(Request::Background).await;
        info!(turn = self.turn(), "Backgrounded, waiting for a controller to reattach");
    }

    /// Current committed grid and turn
    pub fn status(&self) -> StatusReport {
        let (world, turn) = match self.inner.committed.read().as_ref() {
            Some(committed) => (committed.world().clone(), committed.turn),
            None => (Grid::dead(0, 0), 0),
        };
        StatusReport {
            alive_cells: world.alive_count(),
            world,
            turn,
            status: self.inner.gate.status(),
        }
    }

    /// Stop the session, kill every worker and shut down
    pub async fn kill(&self) {
        let inner = &self.inner;
        info!(turn = self.turn(), "Kill received");
        inner.halt.send_replace(true);
        inner.calls.broadcast(Request::Kill).await;

        let server_stop = inner.server_stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(KILL_GRACE).await;
            server_stop.send_replace(true);
        });
    }

    /// Best-effort fan-out to workers; nothing to tell when rounds run locally
    async fn broadcast(&self, request: Request) {
        if !self.inner.executor.is_local() {
            self.inner.calls.broadcast(request).await;
        }
    }
}
