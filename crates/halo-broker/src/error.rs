//! Broker errors

use halo_core::HaloError;
use halo_transport::TransportError;
use std::sync::Arc;

/// Errors that end a run or reject a control request
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Grid, partition or configuration problem
    #[error(transparent)]
    Core(#[from] HaloError),

    /// Listening socket or other non-worker transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reconnect budget spent for one worker
    #[error("Worker {index} at {endpoint} unreachable after {attempts} attempts: {last_error}")]
    WorkerUnreachable {
        /// Slot index
        index: usize,
        /// Worker address
        endpoint: String,
        /// Dial attempts made
        attempts: u32,
        /// Failure of the final attempt
        last_error: String,
    },

    /// Worker answered with `Failed`
    #[error("Worker {index} failed: {message}")]
    Remote {
        /// Slot index
        index: usize,
        /// Worker's reason
        message: String,
    },

    /// Worker answered with something that does not fit the request
    #[error("Protocol error from worker {index}: {message}")]
    Protocol {
        /// Slot index
        index: usize,
        /// What was wrong
        message: String,
    },

    /// Workers could not be told to resume
    #[error("Resume failed: {message}")]
    ResumeFailed {
        /// Reason
        message: String,
    },

    /// A run was requested that does not match the active session
    #[error("Session conflict: {message}")]
    SessionConflict {
        /// Reason
        message: String,
    },

    /// The session task stopped without reporting an outcome
    #[error("Session task aborted: {message}")]
    SessionAborted {
        /// Panic or cancellation reason
        message: String,
    },

    /// The broker was killed
    #[error("Broker is shutting down")]
    Shutdown,

    /// Failure of a session shared with other callers
    #[error(transparent)]
    Session(Arc<BrokerError>),
}

impl BrokerError {
    /// Create a protocol error
    pub fn protocol(index: usize, message: impl Into<String>) -> Self {
        Self::Protocol {
            index,
            message: message.into(),
        }
    }

    /// Create a session conflict error
    pub fn session_conflict(message: impl Into<String>) -> Self {
        Self::SessionConflict {
            message: message.into(),
        }
    }

    /// Create a resume failure
    pub fn resume_failed(message: impl Into<String>) -> Self {
        Self::ResumeFailed {
            message: message.into(),
        }
    }

    /// The underlying error, looking through shared session failures
    pub fn root(&self) -> &BrokerError {
        match self {
            BrokerError::Session(inner) => inner.root(),
            other => other,
        }
    }
}

/// Result alias for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
