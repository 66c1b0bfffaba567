//! Worker node driven over a real TCP connection

#![allow(clippy::unwrap_used, clippy::expect_used)]

use halo_core::{Grid, Params};
use halo_node::{serve_on, NodeConfig, NodeService};
use halo_transport::{EvolveRequest, Request, Response, RpcClient, RpcServer, TransportConfig};
use std::sync::Arc;
use std::time::Duration;

async fn start_node() -> (Arc<NodeService>, RpcClient, tokio::task::JoinHandle<()>) {
    let config = NodeConfig {
        listen: "127.0.0.1:0".to_string(),
        kill_grace_ms: 10,
    };
    let server = RpcServer::bind(&config.listen, TransportConfig::default()).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let node = Arc::new(NodeService::new(&config));
    let task = {
        let node = node.clone();
        tokio::spawn(async move { serve_on(server, node).await.unwrap() })
    };
    let client = RpcClient::connect(&addr, &TransportConfig::default()).await.unwrap();
    (node, client, task)
}

fn glider_strip() -> EvolveRequest {
    let world = Grid::with_live_cells(6, 6, &[(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]);
    EvolveRequest {
        world,
        params: Params::new(6, 6, 4),
        turn: 0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_evolve_status_and_kill() {
    let (_node, client, server) = start_node().await;

    client.call(Request::SetPaused { paused: true }).await.unwrap();
    client.call(Request::SetPaused { paused: false }).await.unwrap();

    let first = match client.call(Request::Evolve(glider_strip())).await.unwrap() {
        Response::Evolved(response) => response,
        other => panic!("unexpected response {other:?}"),
    };
    assert_eq!(first.turn, 1);
    assert_eq!(first.alive_cells, 5);

    let report = match client.call(Request::Status).await.unwrap() {
        Response::Status(report) => report,
        other => panic!("unexpected response {other:?}"),
    };
    assert_eq!(report.turn, 1);
    assert_eq!(report.world, first.world);

    assert_eq!(client.call(Request::Kill).await.unwrap(), Response::Ack);
    tokio::time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_background_then_resuming_evolve() {
    let (node, client, server) = start_node().await;

    let Response::Evolved(first) = client.call(Request::Evolve(glider_strip())).await.unwrap() else {
        panic!("evolve failed");
    };
    assert_eq!(client.call(Request::Background).await.unwrap(), Response::Ack);
    assert_eq!(node.status(), halo_core::PauseStatus::Paused);

    let Response::Evolved(again) = client.call(Request::Evolve(glider_strip())).await.unwrap() else {
        panic!("evolve failed");
    };
    assert_eq!(again, first);
    assert_eq!(node.status(), halo_core::PauseStatus::Running);

    client.call(Request::Kill).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
}
