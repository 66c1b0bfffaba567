//! Broker configuration

use halo_core::{HaloError, HaloResult};
use halo_transport::ReconnectConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[broker]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address the broker listens on for controllers
    pub listen: String,
    /// Worker endpoints, one per slot, in strip order
    pub workers: Vec<String>,
    /// Bound on best-effort broadcasts (`Kill`, pause fan-out), in milliseconds
    pub kill_timeout_ms: u64,
    /// Redial policy for failed workers
    pub reconnect: ReconnectConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8030".to_string(),
            workers: (8031..=8034).map(|port| format!("127.0.0.1:{port}")).collect(),
            kill_timeout_ms: 2_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Broadcast timeout as a duration
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> HaloResult<()> {
        if self.listen.trim().is_empty() {
            return Err(HaloError::config("broker.listen must not be empty"));
        }
        if self.workers.is_empty() {
            return Err(HaloError::config("broker.workers must list at least one endpoint"));
        }
        if let Some(blank) = self.workers.iter().position(|w| w.trim().is_empty()) {
            return Err(HaloError::config(format!("broker.workers[{blank}] is empty")));
        }
        if self.kill_timeout_ms == 0 {
            return Err(HaloError::config("broker.kill_timeout_ms must be greater than 0"));
        }
        self.reconnect.validate()
    }
}
