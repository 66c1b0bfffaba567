//! CLI command handlers

pub mod control;
pub mod run;
pub mod service;

use crate::config::HaloConfig;
use anyhow::{bail, Context, Result};
use clap::Args;
use halo_transport::{Request, Response, RpcClient};

/// Where to find the broker
#[derive(Args, Debug, Clone, Default)]
pub struct ControlArgs {
    /// Broker address (defaults to the configured broker listen address)
    #[arg(long)]
    pub broker: Option<String>,
}

impl ControlArgs {
    /// Resolve the broker address against the config file
    pub fn endpoint(&self, config: &HaloConfig) -> String {
        self.broker.clone().unwrap_or_else(|| config.broker_endpoint())
    }

    /// Open a controller connection to the broker
    pub async fn connect(&self, config: &HaloConfig) -> Result<RpcClient> {
        let endpoint = self.endpoint(config);
        RpcClient::connect(&endpoint, &config.transport)
            .await
            .with_context(|| format!("failed to reach broker at {endpoint}"))
    }
}

/// Send one request, turning a `Failed` answer into an error
pub async fn call(client: &RpcClient, request: Request) -> Result<Response> {
    let name = request.name();
    let response = client
        .call(request)
        .await
        .with_context(|| format!("{name} request to {} failed", client.endpoint()))?;
    if let Response::Failed { message } = response {
        bail!("broker rejected {name}: {message}");
    }
    Ok(response)
}
