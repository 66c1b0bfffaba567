//! `halo broker` and `halo node`

use crate::config::HaloConfig;
use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

/// Broker overrides
#[derive(Args, Debug, Clone, Default)]
pub struct BrokerArgs {
    /// Address to listen on for controllers
    #[arg(long)]
    pub listen: Option<String>,

    /// Worker endpoints in strip order, comma separated
    #[arg(long, value_delimiter = ',')]
    pub workers: Vec<String>,
}

impl BrokerArgs {
    /// Apply the flags over the file configuration
    pub fn apply(self, config: &mut HaloConfig) {
        if let Some(listen) = self.listen {
            config.broker.listen = listen;
        }
        if !self.workers.is_empty() {
            config.broker.workers = self.workers;
        }
    }
}

/// Node overrides
#[derive(Args, Debug, Clone, Default)]
pub struct NodeArgs {
    /// Address to listen on for the broker
    #[arg(long)]
    pub listen: Option<String>,
}

impl NodeArgs {
    /// Apply the flags over the file configuration
    pub fn apply(self, config: &mut HaloConfig) {
        if let Some(listen) = self.listen {
            config.node.listen = listen;
        }
    }
}

/// Serve the broker until it is killed or interrupted
pub async fn run_broker(config: &HaloConfig) -> Result<()> {
    info!(
        listen = %config.broker.listen,
        workers = config.broker.workers.len(),
        "Starting broker"
    );
    tokio::select! {
        result = halo_broker::serve(config.broker.clone(), config.transport.clone()) => {
            result.context("broker stopped with an error")?;
            info!("Broker killed, exiting");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("Interrupted, stopping broker");
        }
    }
    Ok(())
}

/// Serve a worker node until it is killed or interrupted
pub async fn run_node(config: &HaloConfig) -> Result<()> {
    info!(listen = %config.node.listen, "Starting worker node");
    tokio::select! {
        result = halo_node::serve(&config.node, config.transport.clone()) => {
            result.context("node stopped with an error")?;
            info!("Node killed, exiting");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("Interrupted, stopping node");
        }
    }
    Ok(())
}
