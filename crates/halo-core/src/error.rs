//! Unified error type for the halo core
//!
//! Everything that can go wrong before a single byte touches the network:
//! partition arithmetic, strip shapes, image files and configuration.

use std::path::PathBuf;

/// Errors raised by the core grid model
#[derive(Debug, thiserror::Error)]
pub enum HaloError {
    /// Worker count cannot split the grid height into non-empty strips
    #[error("Invalid partition: cannot split {height} rows across {workers} workers")]
    InvalidPartition {
        /// Grid height in rows
        height: usize,
        /// Requested worker count
        workers: usize,
    },

    /// A strip does not have the dimensions the partition expects
    #[error("Strip shape mismatch for worker {worker}: {message}")]
    StripShape {
        /// Index of the offending worker
        worker: usize,
        /// Description of the mismatch
        message: String,
    },

    /// Grid construction was given inconsistent dimensions
    #[error("Invalid grid: {message}")]
    InvalidGrid {
        /// Description of the problem
        message: String,
    },

    /// PGM image is malformed or does not match the requested parameters
    #[error("Image error in {path}: {message}")]
    Image {
        /// File being read or written
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Underlying filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HaloError {
    /// Create a strip shape error
    pub fn strip_shape(worker: usize, message: impl Into<String>) -> Self {
        Self::StripShape {
            worker,
            message: message.into(),
        }
    }

    /// Create an invalid grid error
    pub fn invalid_grid(message: impl Into<String>) -> Self {
        Self::InvalidGrid {
            message: message.into(),
        }
    }

    /// Create an image error
    pub fn image(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Image {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result alias for core operations
pub type HaloResult<T> = Result<T, HaloError>;
