//! Halo Transport
//!
//! Length-prefixed bincode RPC over TCP used between the controller, the
//! broker and the worker fleet. Clients are multiplexed: several requests may
//! be outstanding on one connection and responses are matched by id.

pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod messages;
pub mod reconnect;
pub mod server;

pub use client::RpcClient;
pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use link::{Connector, TcpConnector, WorkerLink};
pub use messages::{
    Envelope, EvolveRequest, EvolveResponse, Request, Response, RunReport, RunRequest, StatusReport,
};
pub use reconnect::{connect_with_backoff, ReconnectConfig};
pub use server::{RpcHandler, RpcServer};
