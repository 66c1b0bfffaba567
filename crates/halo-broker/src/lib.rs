//! Halo Broker
//!
//! Drives a distributed Game of Life run across a fixed fleet of workers.
//! Each round splits the committed grid into haloed strips, evolves them
//! concurrently, and commits the stitched result. A worker that drops off is
//! redialled with bounded backoff while its siblings are paused, and the
//! round is retried from committed state.
//!
//! The broker also keeps the run alive when its controller goes away: a
//! backgrounded session holds its state until a controller reattaches.

pub mod broker;
pub mod call;
pub mod config;
pub mod control;
pub mod error;
pub mod round;
pub mod session;
pub mod table;

pub use broker::Broker;
pub use call::{CallOutcome, FaultTolerantCall};
pub use config::BrokerConfig;
pub use control::{serve, serve_on};
pub use error::{BrokerError, BrokerResult};
pub use round::{RoundExecutor, RoundOutcome};
pub use session::SessionOutcome;
pub use table::{WorkerSlot, WorkerTable};
