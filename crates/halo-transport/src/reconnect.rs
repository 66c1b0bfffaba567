//! Reconnect policy
//!
//! Bounded exponential backoff for redialling a worker at its fixed endpoint:
//! - Wait `base_delay_ms` before the first attempt, multiplying the delay by
//!   `multiplier` after each failure and capping it at `max_delay_ms`
//! - Give up after `max_attempts` attempts with [`TransportError::Exhausted`]
//! - `max_attempts = None` retries forever and must be asked for explicitly

use crate::error::{TransportError, TransportResult};
use crate::link::{Connector, WorkerLink};
use halo_core::{HaloError, HaloResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for reconnection behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of attempts before giving up; `None` never gives up
    pub max_attempts: Option<u32>,
    /// Delay before the first attempt in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_delay_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for doubling)
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(20),
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Validate configuration settings
    pub fn validate(&self) -> HaloResult<()> {
        if self.max_attempts == Some(0) {
            return Err(HaloError::config("reconnect.max_attempts must be greater than 0"));
        }
        if self.base_delay_ms == 0 {
            return Err(HaloError::config("reconnect.base_delay_ms must be greater than 0"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(HaloError::config(
                "reconnect.max_delay_ms must not be below reconnect.base_delay_ms",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(HaloError::config("reconnect.multiplier must be at least 1.0"));
        }
        Ok(())
    }

    /// Delay to wait before attempt `attempt_number` (1-based)
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    fn allows(&self, attempt_number: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt_number <= max)
    }
}

/// Dial `endpoint` until it answers or the policy gives up
///
/// Returns the new link and the number of attempts it took.
pub async fn connect_with_backoff(
    connector: &dyn Connector,
    endpoint: &str,
    config: &ReconnectConfig,
) -> TransportResult<(Arc<dyn WorkerLink>, u32)> {
    let mut attempt_number = 1;
    let mut last_error = String::from("no attempt made");

    while config.allows(attempt_number) {
        let delay = config.backoff_delay(attempt_number);
        debug!(
            endpoint = %endpoint,
            attempt = attempt_number,
            delay_ms = delay.as_millis() as u64,
            "Scheduled reconnection attempt"
        );
        sleep(delay).await;

        match connector.connect(endpoint).await {
            Ok(link) => {
                info!(endpoint = %endpoint, attempt = attempt_number, "Reconnected");
                return Ok((link, attempt_number));
            }
            Err(e) => {
                warn!(
                    endpoint = %endpoint,
                    attempt = attempt_number,
                    error = %e,
                    "Reconnection attempt failed"
                );
                last_error = e.to_string();
            }
        }
        attempt_number = attempt_number.saturating_add(1);
    }

    Err(TransportError::Exhausted {
        endpoint: endpoint.to_string(),
        attempts: attempt_number - 1,
        last_error,
    })
}
