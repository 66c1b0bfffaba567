//! Worker node configuration

use halo_core::{HaloError, HaloResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[node]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the node listens on
    pub listen: String,
    /// Time between acknowledging `Kill` and shutting down, in milliseconds
    pub kill_grace_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8031".to_string(),
            kill_grace_ms: 100,
        }
    }
}

impl NodeConfig {
    /// Grace period after `Kill`
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> HaloResult<()> {
        if self.listen.trim().is_empty() {
            return Err(HaloError::config("node.listen must not be empty"));
        }
        Ok(())
    }
}
