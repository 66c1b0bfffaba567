//! Command-line interface for halo
//!
//! Runs the broker and worker nodes, and drives the broker as a controller.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{
    control::{self, SnapshotArgs},
    run::{self, RunArgs},
    service::{self, BrokerArgs, NodeArgs},
    ControlArgs,
};
use config::HaloConfig;

#[derive(Parser)]
#[command(name = "halo")]
#[command(about = "Halo - distributed Game of Life broker and worker fleet", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (defaults to ./halo.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broker
    Broker(BrokerArgs),

    /// Run a worker node
    Node(NodeArgs),

    /// Submit a run and wait for the final grid
    Run(RunArgs),

    /// Show the broker's turn and alive cells
    Status(ControlArgs),

    /// Toggle pause on the broker
    Pause(ControlArgs),

    /// Put the broker in background mode; `halo run` reattaches
    Detach(ControlArgs),

    /// Save the broker's current grid
    Snapshot(SnapshotArgs),

    /// Stop the broker and every worker
    Kill(ControlArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = HaloConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Broker(args) => {
            args.apply(&mut config);
            config.validate()?;
            service::run_broker(&config).await?;
        }
        Commands::Node(args) => {
            args.apply(&mut config);
            config.validate()?;
            service::run_node(&config).await?;
        }
        Commands::Run(args) => {
            config.transport.validate()?;
            run::run(args, &config).await?;
        }
        Commands::Status(args) => control::status(&args, &config).await?,
        Commands::Pause(args) => control::pause(&args, &config).await?,
        Commands::Detach(args) => control::detach(&args, &config).await?,
        Commands::Snapshot(args) => control::snapshot(&args, &config).await?,
        Commands::Kill(args) => control::kill(&args, &config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "halo", "run", "--broker", "10.0.0.5:8030", "-W", "64", "-H", "32", "--turns", "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.control.broker.as_deref(), Some("10.0.0.5:8030"));
                assert_eq!((args.width, args.height, args.turns), (64, 32, 7));
                assert_eq!(args.images, PathBuf::from("images"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_broker_worker_override() {
        let cli = Cli::try_parse_from([
            "halo", "broker", "--workers", "a:1,b:2", "--listen", "127.0.0.1:9000",
        ])
        .unwrap();
        let mut config = HaloConfig::default();
        match cli.command {
            Commands::Broker(args) => args.apply(&mut config),
            _ => panic!("expected broker"),
        }
        assert_eq!(config.broker.workers, vec!["a:1".to_string(), "b:2".to_string()]);
        assert_eq!(config.broker.listen, "127.0.0.1:9000");
    }
}
