//! Paused gate shared by the broker round loop and each worker
//!
//! The gate is a tri-state status behind a watch channel. Anything that must
//! not make progress while paused awaits [`PauseGate::wait_until_running`].
//! Every transition happens inside one `send_if_modified` call, so two
//! concurrent toggles can never both observe the same starting state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Gate status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PauseStatus {
    /// Rounds may be dispatched
    Running,
    /// Nothing may be dispatched until released
    Paused,
    /// Released, but workers must be told to resume before the next round
    Resuming,
}

impl fmt::Display for PauseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PauseStatus::Running => "running",
            PauseStatus::Paused => "paused",
            PauseStatus::Resuming => "resuming",
        };
        f.write_str(label)
    }
}

/// Tri-state pause gate
#[derive(Debug)]
pub struct PauseGate {
    status: watch::Sender<PauseStatus>,
}

impl PauseGate {
    /// Create a running gate
    pub fn new() -> Self {
        Self::with_status(PauseStatus::Running)
    }

    /// Create a gate in the given state
    pub fn with_status(status: PauseStatus) -> Self {
        let (tx, _rx) = watch::channel(status);
        Self { status: tx }
    }

    /// Current status
    pub fn status(&self) -> PauseStatus {
        *self.status.borrow()
    }

    /// Whether the gate is holding waiters
    pub fn is_paused(&self) -> bool {
        self.status() == PauseStatus::Paused
    }

    /// Force the gate into `status`, returning the previous one
    pub fn set(&self, status: PauseStatus) -> PauseStatus {
        self.status.send_replace(status)
    }

    /// Move from `from` to `to`; false when the gate was not in `from`
    pub fn transition(&self, from: PauseStatus, to: PauseStatus) -> bool {
        self.status.send_if_modified(|current| {
            if *current == from && from != to {
                *current = to;
                true
            } else {
                false
            }
        })
    }

    /// Pause; false when already paused
    pub fn pause(&self) -> bool {
        self.status.send_if_modified(|current| {
            if *current == PauseStatus::Paused {
                false
            } else {
                *current = PauseStatus::Paused;
                true
            }
        })
    }

    /// Release to `Running`; false when already running
    pub fn release(&self) -> bool {
        self.status.send_if_modified(|current| {
            if *current == PauseStatus::Running {
                false
            } else {
                *current = PauseStatus::Running;
                true
            }
        })
    }

    /// Flip between paused and running, returning the new status
    ///
    /// `Resuming` counts as not paused and flips to `Paused`.
    pub fn toggle(&self) -> PauseStatus {
        let mut next = PauseStatus::Running;
        self.status.send_modify(|current| {
            next = match *current {
                PauseStatus::Paused => PauseStatus::Running,
                PauseStatus::Running | PauseStatus::Resuming => PauseStatus::Paused,
            };
            *current = next;
        });
        next
    }

    /// Wait until the gate is not `Paused`, returning the status observed
    pub async fn wait_until_running(&self) -> PauseStatus {
        let mut rx = self.status.subscribe();
        let observed = match rx.wait_for(|status| *status != PauseStatus::Paused).await {
            Ok(status) => *status,
            // The sender lives in `self`, so the channel cannot close under us
            Err(_) => self.status(),
        };
        observed
    }

    /// Subscribe to status changes
    pub fn subscribe(&self) -> watch::Receiver<PauseStatus> {
        self.status.subscribe()
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
