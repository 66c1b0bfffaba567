//! Worker client table
//!
//! One slot per configured worker. A slot's endpoint never changes; only its
//! connection is replaced, and only by a redial. Every replacement bumps the
//! slot's generation so that two calls which failed on the same connection
//! redial it once between them.

use crate::error::{BrokerError, BrokerResult};
use halo_transport::{connect_with_backoff, Connector, ReconnectConfig, TransportError, WorkerLink};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

struct Current {
    link: Option<Arc<dyn WorkerLink>>,
    generation: u64,
}

/// A worker's fixed endpoint and current connection
pub struct WorkerSlot {
    index: usize,
    endpoint: String,
    current: RwLock<Current>,
    redial: Mutex<()>,
}

impl WorkerSlot {
    fn new(index: usize, endpoint: String) -> Self {
        Self {
            index,
            endpoint,
            current: RwLock::new(Current {
                link: None,
                generation: 0,
            }),
            redial: Mutex::new(()),
        }
    }

    /// Slot index, which is also the strip index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Fixed worker address
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current connection and its generation
    pub fn current(&self) -> (Option<Arc<dyn WorkerLink>>, u64) {
        let current = self.current.read();
        (current.link.clone(), current.generation)
    }

    /// Generation of the current connection
    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Whether a connection is installed
    pub fn is_connected(&self) -> bool {
        self.current.read().link.is_some()
    }

    /// Replace the connection seen at `generation` with a fresh one
    ///
    /// If another caller already replaced it, returns without dialling.
    pub async fn redial(
        &self,
        generation: u64,
        connector: &dyn Connector,
        policy: &ReconnectConfig,
    ) -> BrokerResult<()> {
        let _redial = self.redial.lock().await;
        if self.generation() != generation {
            debug!(worker = self.index, generation, "Slot already redialled");
            return Ok(());
        }

        match connect_with_backoff(connector, &self.endpoint, policy).await {
            Ok((link, attempts)) => {
                let mut current = self.current.write();
                current.link = Some(link);
                current.generation += 1;
                info!(
                    worker = self.index,
                    endpoint = %self.endpoint,
                    attempts,
                    generation = current.generation,
                    "Worker connection replaced"
                );
                Ok(())
            }
            Err(TransportError::Exhausted {
                attempts,
                last_error,
                ..
            }) => Err(BrokerError::WorkerUnreachable {
                index: self.index,
                endpoint: self.endpoint.clone(),
                attempts,
                last_error,
            }),
            Err(other) => Err(other.into()),
        }
    }
}

/// All worker slots, in strip order
pub struct WorkerTable {
    slots: Vec<WorkerSlot>,
}

impl WorkerTable {
    /// Create a table of disconnected slots
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = endpoints
            .into_iter()
            .enumerate()
            .map(|(index, endpoint)| WorkerSlot::new(index, endpoint.into()))
            .collect();
        Self { slots }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot `index`
    ///
    /// # Panics
    /// Panics if `index` is out of range; slot indices come from the table.
    pub fn slot(&self, index: usize) -> &WorkerSlot {
        &self.slots[index]
    }

    /// Iterate over slots in order
    pub fn slots(&self) -> impl Iterator<Item = &WorkerSlot> {
        self.slots.iter()
    }

    /// Dial every slot that has no connection yet
    pub async fn connect_missing(
        &self,
        connector: &dyn Connector,
        policy: &ReconnectConfig,
    ) -> BrokerResult<()> {
        let dials = self
            .slots
            .iter()
            .filter(|slot| !slot.is_connected())
            .map(|slot| slot.redial(slot.generation(), connector, policy));
        futures::future::try_join_all(dials).await?;
        Ok(())
    }
}
