//! Transport configuration

use halo_core::{HaloError, HaloResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Socket-level settings shared by clients and servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest frame accepted or sent, in bytes
    pub max_frame_bytes: usize,
    /// Time allowed for a single dial
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 256 * 1024 * 1024,
            connect_timeout_ms: 2_000,
        }
    }
}

impl TransportConfig {
    /// Dial timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> HaloResult<()> {
        if self.max_frame_bytes == 0 {
            return Err(HaloError::config("transport.max_frame_bytes must be greater than 0"));
        }
        if self.max_frame_bytes > u32::MAX as usize {
            return Err(HaloError::config(
                "transport.max_frame_bytes must fit in a 32-bit length prefix",
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(HaloError::config("transport.connect_timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}
