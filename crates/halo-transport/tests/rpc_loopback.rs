//! Loopback tests for the multiplexed RPC client and server
//!
//! These run a real server on an ephemeral port and verify that requests on
//! one connection are independent of each other.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use halo_core::{Grid, PauseStatus};
use halo_transport::{
    Request, Response, RpcClient, RpcHandler, RpcServer, StatusReport, TransportConfig,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// `Status` blocks until a `SetPaused { paused: false }` arrives
#[derive(Default)]
struct GatedHandler {
    release: Notify,
    toggles: AtomicU64,
}

#[async_trait]
impl RpcHandler for GatedHandler {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Status => {
                self.release.notified().await;
                Response::Status(StatusReport {
                    world: Grid::dead(2, 2),
                    turn: 9,
                    alive_cells: 0,
                    status: PauseStatus::Running,
                })
            }
            Request::SetPaused { paused } => {
                if !paused {
                    self.release.notify_one();
                }
                Response::PauseState { paused, turn: 9 }
            }
            Request::TogglePause => {
                let turn = self.toggles.fetch_add(1, Ordering::SeqCst);
                Response::PauseState { paused: true, turn }
            }
            other => Response::failed(format!("unsupported request {}", other.name())),
        }
    }
}

async fn start(handler: Arc<GatedHandler>) -> (String, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let server = RpcServer::bind("127.0.0.1:0", TransportConfig::default()).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        server.serve(handler, stop_rx).await.unwrap();
    });
    (addr, stop_tx, task)
}

// ============================================================================
// Multiplexing
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_out_of_order_responses_reach_their_callers() {
    let handler = Arc::new(GatedHandler::default());
    let (addr, stop, server) = start(handler).await;
    let client = Arc::new(RpcClient::connect(&addr, &TransportConfig::default()).await.unwrap());

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call(Request::Status).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!slow.is_finished());

    // Answered first even though it was sent second
    let resumed = client.call(Request::SetPaused { paused: false }).await.unwrap();
    assert_eq!(resumed, Response::PauseState { paused: false, turn: 9 });

    let status = slow.await.unwrap().unwrap();
    match status {
        Response::Status(report) => assert_eq!(report.turn, 9),
        other => panic!("unexpected response {other:?}"),
    }

    stop.send(true).unwrap();
    server.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_call_does_not_poison_connection() {
    let handler = Arc::new(GatedHandler::default());
    let (addr, stop, server) = start(handler.clone()).await;
    let client = RpcClient::connect(&addr, &TransportConfig::default()).await.unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(30), client.call(Request::Status)).await;
    assert!(abandoned.is_err());

    // The blocked Status now answers, but nobody is waiting for it
    handler.release.notify_one();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let toggled = client.call(Request::TogglePause).await.unwrap();
    assert_eq!(toggled, Response::PauseState { paused: true, turn: 0 });
    assert!(!client.is_closed());

    stop.send(true).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_unsupported_request_is_answered_with_failure() {
    let (addr, stop, server) = start(Arc::new(GatedHandler::default())).await;
    let client = RpcClient::connect(&addr, &TransportConfig::default()).await.unwrap();

    let response = client.call(Request::Kill).await.unwrap();
    assert!(matches!(response, Response::Failed { .. }));

    stop.send(true).unwrap();
    server.await.unwrap();
}

// ============================================================================
// Connection loss
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_shutdown_fails_pending_calls() {
    let (addr, stop, server) = start(Arc::new(GatedHandler::default())).await;
    let client = Arc::new(RpcClient::connect(&addr, &TransportConfig::default()).await.unwrap());

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.call(Request::Status).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    stop.send(true).unwrap();
    server.await.unwrap();

    assert!(pending.await.unwrap().is_err());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(client.is_closed());
    assert!(client.call(Request::TogglePause).await.is_err());
}

#[tokio::test]
async fn test_connect_to_dead_endpoint_fails() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    assert!(RpcClient::connect(&addr, &TransportConfig::default()).await.is_err());
}
