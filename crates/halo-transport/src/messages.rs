//! Wire messages
//!
//! One request enum covers both surfaces: the controller talks to the broker
//! with `Run`, `Status`, `TogglePause`, `Background` and `Kill`; the broker
//! talks to workers with `Evolve`, `Status`, `SetPaused`, `Background` and
//! `Kill`. Handlers answer requests they do not serve with `Failed`.

use halo_core::{Grid, Params, PauseStatus};
use serde::{Deserialize, Serialize};

/// Frame payload tagged with the id used to match responses to requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Request id, echoed by the response
    pub id: u64,
    /// Message body
    pub body: T,
}

/// Start (or reattach to) a full run on the broker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Initial grid
    pub world: Grid,
    /// Run parameters; dimensions must match `world`
    pub params: Params,
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Grid after the last committed turn
    pub world: Grid,
    /// Live cells in `world`
    pub alive_cells: usize,
    /// Turns completed
    pub turn: u64,
}

/// One local turn for a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolveRequest {
    /// Haloed strip, `params.image_height` rows
    pub world: Grid,
    /// Run parameters with the strip's local height
    pub params: Params,
    /// Turn being computed (the broker's committed turn)
    pub turn: u64,
}

/// Result of one local turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolveResponse {
    /// Next generation of the strip, halo rows included
    pub world: Grid,
    /// Live cells in `world`
    pub alive_cells: usize,
    /// Turn the strip now represents
    pub turn: u64,
}

/// Snapshot for status polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Current grid (a worker reports its local strip)
    pub world: Grid,
    /// Turns completed
    pub turn: u64,
    /// Live cells in `world`
    pub alive_cells: usize,
    /// Gate status of the responder
    pub status: PauseStatus,
}

/// RPC request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Controller → broker: run the whole simulation
    Run(RunRequest),
    /// Broker → worker: compute one turn of a strip
    Evolve(EvolveRequest),
    /// Current grid, turn and live cell count
    Status,
    /// Controller → broker: flip the pause state
    TogglePause,
    /// Broker → worker: set the pause state
    SetPaused {
        /// Target state
        paused: bool,
    },
    /// Hold state until a controller reattaches
    Background,
    /// Terminate
    Kill,
}

impl Request {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Request::Run(_) => "run",
            Request::Evolve(_) => "evolve",
            Request::Status => "status",
            Request::TogglePause => "toggle_pause",
            Request::SetPaused { .. } => "set_paused",
            Request::Background => "background",
            Request::Kill => "kill",
        }
    }
}

/// RPC response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Answer to `Run`
    Completed(RunReport),
    /// Answer to `Evolve`
    Evolved(EvolveResponse),
    /// Answer to `Status`
    Status(StatusReport),
    /// Answer to `TogglePause` and `SetPaused`
    PauseState {
        /// Pause state after the request
        paused: bool,
        /// Turn the responder is on
        turn: u64,
    },
    /// Generic acknowledgement
    Ack,
    /// The handler could not serve the request
    Failed {
        /// Reason
        message: String,
    },
}

impl Response {
    /// Create a failure response
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Response::Completed(_) => "completed",
            Response::Evolved(_) => "evolved",
            Response::Status(_) => "status",
            Response::PauseState { .. } => "pause_state",
            Response::Ack => "ack",
            Response::Failed { .. } => "failed",
        }
    }
}
