//! Broker runs against an in-memory worker fleet
//!
//! Every final grid is checked against the single-process reference
//! `life::run`, so any lost, duplicated or misplaced row shows up as a
//! mismatch.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_matches::assert_matches;
use halo_broker::{
    Broker, BrokerConfig, BrokerError, CallOutcome, FaultTolerantCall, RoundExecutor, RoundOutcome,
    WorkerTable,
};
use halo_core::{life, Grid, HaloError, Params, PauseStatus};
use halo_testkit::{glider, r_pentomino, soup, MemoryFleet};
use halo_transport::{Request, Response, RunReport, RunRequest};
use std::sync::Arc;
use std::time::Duration;

fn broker_for(fleet: &MemoryFleet, max_attempts: u32) -> Broker {
    let config = BrokerConfig {
        listen: "127.0.0.1:0".to_string(),
        workers: fleet.endpoints(),
        kill_timeout_ms: 500,
        reconnect: MemoryFleet::fast_reconnect(max_attempts),
    };
    Broker::new(config, fleet.connector()).unwrap()
}

fn request(world: Grid, turns: u64) -> RunRequest {
    RunRequest {
        params: Params::new(world.width(), world.height(), turns),
        world,
    }
}

async fn run_on(workers: usize, world: Grid, turns: u64) -> RunReport {
    let fleet = MemoryFleet::new(workers);
    broker_for(&fleet, 5).run(request(world, turns)).await.unwrap()
}

/// Poll until the broker has committed at least `turn` turns
async fn wait_for_turn(broker: &Broker, turn: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while broker.turn() < turn {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("broker made no progress");
}

// ============================================================================
// Correctness
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_glider_moves_diagonally_on_one_and_four_workers() {
    for workers in [1, 4] {
        let report = run_on(workers, glider(8, 8, 1, 1), 4).await;
        assert_eq!(report.turn, 4);
        assert_eq!(report.alive_cells, 5);
        assert_eq!(report.world, glider(8, 8, 2, 2), "workers = {workers}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dead_grid_stays_dead() {
    for workers in 1..=16 {
        let fleet = MemoryFleet::new(workers);
        let broker = broker_for(&fleet, 5);
        let report = broker.run(request(Grid::dead(16, 16), 10)).await.unwrap();

        assert_eq!(report.world, Grid::dead(16, 16));
        assert_eq!(report.alive_cells, 0);
        assert_eq!(broker.status().alive_cells, 0);
        assert_eq!(broker.status().turn, 10);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_worker_matches_four_workers() {
    let world = soup(32, 32, 11);
    let single = run_on(1, world.clone(), 25).await;
    let fleet = run_on(4, world.clone(), 25).await;

    assert_eq!(single.world, fleet.world);
    assert_eq!(fleet.world, life::run(&world, 25));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_uneven_partition_matches_reference() {
    // 10 rows over 4 workers splits as [3, 3, 3, 1]
    let world = soup(12, 10, 3);
    let report = run_on(4, world.clone(), 12).await;
    assert_eq!(report.world, life::run(&world, 12));
}

#[tokio::test]
async fn test_zero_turns_returns_input() {
    let world = r_pentomino(16, 16);
    let report = run_on(4, world.clone(), 0).await;
    assert_eq!(report.turn, 0);
    assert_eq!(report.world, world);
}

#[tokio::test]
async fn test_invalid_partition_fails_fast() {
    let fleet = MemoryFleet::new(4);
    let broker = broker_for(&fleet, 5);

    let too_short = broker.run(request(Grid::dead(8, 3), 1)).await;
    assert_matches!(too_short, Err(BrokerError::Core(HaloError::InvalidPartition { .. })));

    let no_rows = broker.run(request(Grid::dead(8, 0), 1)).await;
    assert_matches!(no_rows, Err(BrokerError::Core(HaloError::InvalidPartition { .. })));
    assert_eq!(fleet.dials(0), 0);
}

#[tokio::test]
async fn test_params_must_match_world() {
    let fleet = MemoryFleet::new(2);
    let broker = broker_for(&fleet, 5);
    let mismatched = RunRequest {
        world: Grid::dead(8, 8),
        params: Params::new(8, 16, 1),
    };
    assert_matches!(broker.run(mismatched).await, Err(BrokerError::Core(HaloError::InvalidGrid { .. })));
}

// ============================================================================
// Worker failure
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_crash_mid_run_matches_failure_free_run() {
    let world = soup(24, 24, 5);
    let fleet = MemoryFleet::new(4);
    fleet.crash_at_turn(2, 5);
    let broker = broker_for(&fleet, 5);

    let report = broker.run(request(world.clone(), 20)).await.unwrap();

    assert_eq!(fleet.restarts(2), 1);
    assert_eq!(report.turn, 20);
    assert_eq!(report.world, life::run(&world, 20));
    assert_eq!(broker.gate_status(), PauseStatus::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_restart_is_retried_with_backoff() {
    let world = soup(16, 16, 9);
    let fleet = MemoryFleet::new(3);
    fleet.crash_with_downtime(0, 2, 3);
    let broker = broker_for(&fleet, 10);

    let report = broker.run(request(world.clone(), 8)).await.unwrap();

    assert_eq!(report.world, life::run(&world, 8));
    // Initial dial, three refused redials, one accepted
    assert_eq!(fleet.dials(0), 5);
    assert_eq!(fleet.restarts(0), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_permanently_dead_worker_surfaces_unreachable() {
    let fleet = MemoryFleet::new(4);
    fleet.die_at_turn(1, 3);
    let broker = broker_for(&fleet, 3);

    let err = broker.run(request(soup(16, 16, 1), 10)).await.unwrap_err();
    assert_matches!(
        err.root(),
        BrokerError::WorkerUnreachable { index: 1, attempts: 3, .. }
    );
    assert_eq!(broker.turn(), 3);
}

#[tokio::test]
async fn test_unreachable_worker_at_startup() {
    let fleet = MemoryFleet::new(2);
    fleet.kill_permanently(0);
    let broker = broker_for(&fleet, 2);

    let err = broker.run(request(Grid::dead(4, 4), 1)).await.unwrap_err();
    assert_matches!(err.root(), BrokerError::WorkerUnreachable { index: 0, .. });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_round_aborts_for_resend_and_retry_commits() {
    let fleet = MemoryFleet::new(2);
    fleet.crash_at_turn(1, 0);
    let table = Arc::new(WorkerTable::new(fleet.endpoints()));
    let calls = Arc::new(FaultTolerantCall::new(
        table,
        fleet.connector(),
        MemoryFleet::fast_reconnect(3),
        Duration::from_millis(200),
    ));
    calls.connect_all().await.unwrap();
    let executor = RoundExecutor::new(calls.clone());

    let world = glider(6, 6, 0, 0);
    let params = Params::new(6, 6, 1);
    assert_eq!(executor.execute(&world, &params, 0).await.unwrap(), RoundOutcome::AbortedResend);

    // Release whatever the sibling pause left held
    for index in 0..2 {
        let outcome = calls.call(index, Request::SetPaused { paused: false }).await.unwrap();
        assert_matches!(outcome, CallOutcome::Completed(Response::PauseState { paused: false, .. }));
    }

    let retried = executor.execute(&world, &params, 0).await.unwrap();
    assert_eq!(retried, RoundOutcome::Committed(life::step(&world)));
}

// ============================================================================
// Pause, background and kill
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_and_resume_preserve_state() {
    let world = soup(16, 16, 21);
    let turns = 2_000;
    let fleet = MemoryFleet::new(4);
    let broker = broker_for(&fleet, 5);

    let run = {
        let broker = broker.clone();
        let request = request(world.clone(), turns);
        tokio::spawn(async move { broker.run(request).await })
    };
    wait_for_turn(&broker, 10).await;

    let (paused, _) = broker.toggle_pause().await;
    assert!(paused);
    // Let any round already past its workers settle
    tokio::time::sleep(Duration::from_millis(20)).await;
    let held = broker.status();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let still = broker.status();
    assert_eq!(held.turn, still.turn);
    assert_eq!(held.world, still.world);
    assert_eq!(still.status, PauseStatus::Paused);
    assert_eq!(held.world, life::run(&world, held.turn));

    let (paused, _) = broker.toggle_pause().await;
    assert!(!paused);

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.turn, turns);
    assert_eq!(report.world, life::run(&world, turns));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_do_not_lose_updates() {
    let fleet = MemoryFleet::new(2);
    let broker = broker_for(&fleet, 5);

    let toggles: Vec<_> = (0..10)
        .map(|_| {
            let broker = broker.clone();
            tokio::spawn(async move { broker.toggle_pause().await.0 })
        })
        .collect();
    let mut paused = 0;
    for toggle in toggles {
        if toggle.await.unwrap() {
            paused += 1;
        }
    }

    // Ten serialized flips from running: five pauses, five releases
    assert_eq!(paused, 5);
    assert_eq!(broker.gate_status(), PauseStatus::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_background_then_reattach_continues_session() {
    let world = r_pentomino(16, 16);
    let turns = 1_500;
    let fleet = MemoryFleet::new(2);
    let broker = broker_for(&fleet, 5);

    let first = {
        let broker = broker.clone();
        let request = request(world.clone(), turns);
        tokio::spawn(async move { broker.run(request).await })
    };
    wait_for_turn(&broker, 5).await;

    broker.background().await;
    assert_eq!(broker.gate_status(), PauseStatus::Paused);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let held = broker.turn();
    assert!(held >= 5);

    // A different grid size cannot take over the session
    let conflict = broker.run(request(Grid::dead(8, 8), 3)).await;
    assert_matches!(conflict, Err(BrokerError::SessionConflict { .. }));

    let reattached = broker.run(request(world.clone(), turns)).await.unwrap();
    let original = first.await.unwrap().unwrap();

    assert_eq!(reattached, original);
    assert_eq!(reattached.turn, turns);
    assert_eq!(reattached.world, life::run(&world, turns));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kill_stops_session_and_workers() {
    let fleet = MemoryFleet::new(3);
    let broker = broker_for(&fleet, 5);
    let mut server_stop = broker.shutdown_signal();

    let run = {
        let broker = broker.clone();
        let request = request(soup(16, 16, 4), 1_000_000);
        tokio::spawn(async move { broker.run(request).await })
    };
    wait_for_turn(&broker, 3).await;

    broker.kill().await;
    let err = run.await.unwrap().unwrap_err();
    assert_matches!(err.root(), BrokerError::Shutdown);

    tokio::time::timeout(Duration::from_secs(2), server_stop.wait_for(|stop| *stop))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(fleet.all_shut_down());

    // A killed broker refuses new work
    assert_matches!(broker.run(request(Grid::dead(4, 4), 1)).await, Err(BrokerError::Shutdown));
}

#[tokio::test]
async fn test_status_before_any_run() {
    let fleet = MemoryFleet::new(2);
    let broker = broker_for(&fleet, 5);
    let status = broker.status();
    assert_eq!(status.turn, 0);
    assert_eq!(status.alive_cells, 0);
    assert_eq!(status.status, PauseStatus::Running);
}
