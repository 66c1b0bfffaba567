//! Session round loop and the pause/resume/reconnect state machine
//!
//! Gate transitions driven from here:
//! - `Running -> Resuming` when a round aborts for resend
//! - `Resuming -> Running` once every worker has been told to resume
//!
//! The controller drives `Running <-> Paused` (toggle, background) and
//! `Paused -> Resuming` (reattach) from [`crate::broker`]. Whatever the path,
//! rounds restart from the committed grid and turn, never from partial
//! results and never from turn 0.

use crate::broker::Broker;
use crate::error::{BrokerError, BrokerResult};
use crate::round::RoundOutcome;
use futures::future::try_join_all;
use halo_core::{Grid, Params, PauseStatus};
use halo_transport::{Request, Response, RunReport};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How a session ended, shared by every caller waiting on it
pub type SessionOutcome = Result<RunReport, Arc<BrokerError>>;

/// Last committed grid and the turn it represents
#[derive(Debug, Clone)]
pub(crate) struct Committed {
    world: Arc<Grid>,
    pub(crate) turn: u64,
    pub(crate) params: Params,
}

impl Committed {
    pub(crate) fn new(world: Grid, params: Params) -> Self {
        Self {
            world: Arc::new(world),
            turn: 0,
            params,
        }
    }

    pub(crate) fn world(&self) -> &Grid {
        &self.world
    }
}

/// A session running on its own task
pub(crate) struct SessionHandle {
    id: Uuid,
    params: Params,
    done: watch::Receiver<Option<SessionOutcome>>,
}

impl SessionHandle {
    /// Spawn the round loop for the grid already committed on `broker`
    pub(crate) fn start(broker: Broker, params: Params) -> Self {
        let id = Uuid::new_v4();
        let done = watch_session(id, async move { broker.drive(id).await });
        Self { id, params, done }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn params(&self) -> Params {
        self.params
    }

    pub(crate) fn is_active(&self) -> bool {
        self.done.borrow().is_none()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<SessionOutcome>> {
        self.done.clone()
    }
}

/// Run `rounds` on its own task and publish how it ended
///
/// A second task awaits the first, so the outcome is published even when the
/// round loop panics or is cancelled.
fn watch_session<F>(id: Uuid, rounds: F) -> watch::Receiver<Option<SessionOutcome>>
where
    F: Future<Output = BrokerResult<RunReport>> + Send + 'static,
{
    let (tx, done) = watch::channel(None);
    let rounds = tokio::spawn(rounds);
    tokio::spawn(async move {
        let outcome = match rounds.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(session = %id, error = %e, "Session task died");
                Err(BrokerError::SessionAborted {
                    message: e.to_string(),
                })
            }
        };
        match &outcome {
            Ok(report) => info!(session = %id, turn = report.turn, alive = report.alive_cells, "Run finished"),
            Err(e) => warn!(session = %id, error = %e, "Run ended with error"),
        }
        tx.send_replace(Some(outcome.map_err(Arc::new)));
    });
    done
}

impl Broker {
    /// Run rounds until the committed turn reaches the requested turns
    async fn drive(&self, id: Uuid) -> BrokerResult<RunReport> {
        let mut halt = self.inner.halt.subscribe();
        tokio::select! {
            result = self.rounds(id) => result,
            _ = halt.wait_for(|halted| *halted) => Err(BrokerError::Shutdown),
        }
    }

    async fn rounds(&self, id: Uuid) -> BrokerResult<RunReport> {
        let inner = &self.inner;
        if !inner.executor.is_local() {
            inner.calls.connect_all().await?;
        }
        info!(session = %id, workers = inner.executor.workers(), "Run started");

        loop {
            let (world, params, turn) = match inner.committed.read().as_ref() {
                Some(committed) => (committed.world.clone(), committed.params, committed.turn),
                None => return Err(BrokerError::Shutdown),
            };
            if turn >= params.turns {
                return Ok(RunReport {
                    alive_cells: world.alive_count(),
                    world: (*world).clone(),
                    turn,
                });
            }

            if inner.gate.wait_until_running().await == PauseStatus::Resuming {
                self.resume(turn).await?;
                continue;
            }

            match inner.executor.execute(&world, &params, turn).await? {
                RoundOutcome::Committed(next) => self.commit(turn, next),
                RoundOutcome::AbortedResend => {
                    inner.gate.transition(PauseStatus::Running, PauseStatus::Resuming);
                    warn!(session = %id, turn, "Round aborted, retrying from committed turn");
                }
            }
        }
    }

    fn commit(&self, turn: u64, next: Grid) {
        let mut committed = self.inner.committed.write();
        if let Some(committed) = committed.as_mut().filter(|committed| committed.turn == turn) {
            committed.world = Arc::new(next);
            committed.turn = turn + 1;
            debug!(turn = committed.turn, alive = committed.world.alive_count(), "Round committed");
        }
    }

    /// Tell every worker to resume, then release the gate
    pub(crate) async fn resume(&self, turn: u64) -> BrokerResult<()> {
        let inner = &self.inner;
        let _toggle = inner.toggle.lock().await;
        if inner.gate.status() != PauseStatus::Resuming {
            return Ok(());
        }

        if !inner.executor.is_local() {
            let workers = (0..inner.executor.workers()).map(|index| self.resume_worker(index));
            let worker_turns = try_join_all(workers).await?;
            for (index, worker_turn) in worker_turns.iter().enumerate() {
                if *worker_turn > turn + 1 {
                    warn!(worker = index, worker_turn, turn, "Worker is ahead of the committed turn");
                }
            }
            debug!(turn, ?worker_turns, "Workers resumed");
        }

        if inner.gate.transition(PauseStatus::Resuming, PauseStatus::Running) {
            info!(turn, "Resumed from committed turn");
        }
        Ok(())
    }

    /// Unpause one worker, redialling it once if its connection is gone
    ///
    /// The redial spends one reconnect budget. A worker that cannot be reached
    /// within it, or that fails again on the fresh link, fails the resume.
    async fn resume_worker(&self, index: usize) -> BrokerResult<u64> {
        let calls = &self.inner.calls;
        let mut redialled = false;
        loop {
            let (result, generation) = calls.call_once(index, Request::SetPaused { paused: false }).await;
            match result {
                Ok(Response::PauseState { paused: false, turn }) => return Ok(turn),
                Ok(Response::PauseState { paused: true, .. }) => {
                    return Err(BrokerError::resume_failed(format!("worker {index} stayed paused")));
                }
                Ok(Response::Failed { message }) => return Err(BrokerError::Remote { index, message }),
                Ok(other) => {
                    return Err(BrokerError::protocol(
                        index,
                        format!("expected pause state, got {}", other.name()),
                    ));
                }
                Err(e) if redialled => {
                    return Err(BrokerError::resume_failed(format!(
                        "worker {index} did not resume after reconnecting: {e}"
                    )));
                }
                Err(e) => {
                    warn!(worker = index, error = %e, "Resume failed, reconnecting");
                    calls.recover(index, generation).await?;
                    redialled = true;
                }
            }
        }
    }
}
