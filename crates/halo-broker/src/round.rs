//! Round executor
//!
//! One round turns the committed grid at turn `t` into the grid at `t + 1`:
//! split it into haloed strips, evolve every strip on its worker concurrently,
//! and stitch the results back together in worker order. A round is all or
//! nothing. As soon as any worker call comes back with a resend the remaining
//! calls are dropped and nothing is merged.

use crate::call::{CallOutcome, FaultTolerantCall};
use crate::error::{BrokerError, BrokerResult};
use futures::stream::{FuturesUnordered, StreamExt};
use halo_core::{build_strips, life, merge_strips, Grid, HaloError, Params, Partition};
use halo_transport::{EvolveRequest, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// How a round ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every strip came back; this is the grid for the next turn
    Committed(Grid),
    /// A worker connection was replaced; retry from committed state
    AbortedResend,
}

/// Runs rounds across the worker table
pub struct RoundExecutor {
    calls: Arc<FaultTolerantCall>,
}

impl RoundExecutor {
    /// Create an executor dispatching through `calls`
    pub fn new(calls: Arc<FaultTolerantCall>) -> Self {
        Self { calls }
    }

    /// Number of workers sharing each round
    pub fn workers(&self) -> usize {
        self.calls.table().len()
    }

    /// Whether rounds are computed in-process instead of dispatched
    pub fn is_local(&self) -> bool {
        self.workers() == 1
    }

    /// Partition for `world` across the worker table
    pub fn partition(&self, world: &Grid) -> BrokerResult<Partition> {
        Ok(Partition::new(world.height(), self.workers())?)
    }

    /// Compute turn `turn + 1` from `world`
    pub async fn execute(&self, world: &Grid, params: &Params, turn: u64) -> BrokerResult<RoundOutcome> {
        if self.is_local() {
            let world = world.clone();
            let next = tokio::task::spawn_blocking(move || life::step(&world))
                .await
                .map_err(|e| BrokerError::protocol(0, format!("local step failed: {e}")))?;
            return Ok(RoundOutcome::Committed(next));
        }

        let partition = self.partition(world)?;
        let mut pending: FuturesUnordered<_> = build_strips(world, &partition)
            .into_iter()
            .enumerate()
            .map(|(index, strip)| {
                let request = EvolveRequest {
                    params: params.with_local_height(strip.height()),
                    world: strip,
                    turn,
                };
                async move { (index, self.calls.call(index, Request::Evolve(request)).await) }
            })
            .collect();

        let mut results: Vec<Option<Grid>> = vec![None; partition.len()];
        while let Some((index, outcome)) = pending.next().await {
            match outcome? {
                CallOutcome::Resend => {
                    debug!(worker = index, turn, "Round aborted for resend");
                    return Ok(RoundOutcome::AbortedResend);
                }
                CallOutcome::Completed(Response::Evolved(response)) => {
                    if response.turn != turn + 1 {
                        return Err(BrokerError::protocol(
                            index,
                            format!("expected turn {}, got {}", turn + 1, response.turn),
                        ));
                    }
                    debug!(worker = index, turn, alive = response.alive_cells, "Strip evolved");
                    results[index] = Some(response.world);
                }
                CallOutcome::Completed(other) => {
                    return Err(BrokerError::protocol(
                        index,
                        format!("expected evolved strip, got {}", other.name()),
                    ));
                }
            }
        }

        let strips: Vec<Grid> = results.into_iter().flatten().collect();
        let merged = merge_strips(&strips, &partition, world.width()).map_err(|e| match e {
            HaloError::StripShape { worker, message } => BrokerError::protocol(worker, message),
            other => BrokerError::Core(other),
        })?;
        Ok(RoundOutcome::Committed(merged))
    }
}
