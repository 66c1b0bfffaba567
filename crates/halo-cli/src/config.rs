//! `halo.toml` loading
//!
//! Each library crate owns its section type; this file only stitches them
//! together. Command-line overrides live with each command's arguments.

use halo_broker::BrokerConfig;
use halo_core::{HaloError, HaloResult};
use halo_node::NodeConfig;
use halo_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "halo.toml";

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaloConfig {
    /// `[broker]`
    pub broker: BrokerConfig,
    /// `[node]`
    pub node: NodeConfig,
    /// `[transport]`, shared by every process
    pub transport: TransportConfig,
}

impl HaloConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> HaloResult<Self> {
        toml::from_str(content).map_err(|e| HaloError::config(format!("invalid TOML: {e}")))
    }

    /// Load `path`, or `halo.toml` if it exists, or fall back to defaults
    ///
    /// An explicitly named file that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> HaloResult<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        if !explicit && !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            HaloError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> HaloResult<()> {
        self.broker.validate()?;
        self.node.validate()?;
        self.transport.validate()
    }

    /// Address a controller should dial to reach the configured broker
    ///
    /// Wildcard listen addresses are replaced by loopback.
    pub fn broker_endpoint(&self) -> String {
        let listen = self.broker.listen.trim();
        match listen.rsplit_once(':') {
            Some(("0.0.0.0" | "[::]" | "", port)) => format!("127.0.0.1:{port}"),
            _ => listen.to_string(),
        }
    }
}
