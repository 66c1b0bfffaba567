//! Transport errors
//!
//! Every variant here counts as a transport failure for the broker's
//! fault-tolerant call: the connection is considered gone and is redialled.

use std::time::Duration;

/// Errors raised while talking to a remote peer
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Dial failed
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect {
        /// Address that was dialled
        endpoint: String,
        /// Underlying failure
        message: String,
    },

    /// Socket read or write failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),

    /// Frame exceeds the configured size limit
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Peer closed the connection
    #[error("Connection to {endpoint} closed")]
    Closed {
        /// Remote address
        endpoint: String,
    },

    /// Operation did not finish in time
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// What was being attempted
        operation: String,
        /// Time allowed
        elapsed: Duration,
    },

    /// No live connection is registered for the endpoint
    #[error("Not connected to {endpoint}")]
    NotConnected {
        /// Remote address
        endpoint: String,
    },

    /// Reconnect budget spent without reaching the peer
    #[error("Gave up reconnecting to {endpoint} after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Remote address
        endpoint: String,
        /// Attempts made
        attempts: u32,
        /// Failure of the final attempt
        last_error: String,
    },
}

impl TransportError {
    /// Create a connect error
    pub fn connect(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create a closed-connection error
    pub fn closed(endpoint: impl Into<String>) -> Self {
        Self::Closed {
            endpoint: endpoint.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }
}

/// Result alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
