//! One-shot control commands

use super::{call, ControlArgs};
use crate::config::HaloConfig;
use anyhow::{bail, Result};
use clap::Args;
use halo_core::{pgm, Params};
use halo_transport::{Request, Response, StatusReport};
use std::path::PathBuf;
use tracing::info;

/// Arguments for `halo snapshot`
#[derive(Args, Debug, Clone)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub control: ControlArgs,

    /// Directory the grid is written to
    #[arg(long, default_value = "out")]
    pub out: PathBuf,
}

async fn fetch_status(args: &ControlArgs, config: &HaloConfig) -> Result<StatusReport> {
    let client = args.connect(config).await?;
    match call(&client, Request::Status).await? {
        Response::Status(status) => Ok(status),
        other => bail!("unexpected answer to status: {}", other.name()),
    }
}

/// Print the broker's committed turn and alive cells
pub async fn status(args: &ControlArgs, config: &HaloConfig) -> Result<()> {
    let status = fetch_status(args, config).await?;
    info!(
        turn = status.turn,
        alive = status.alive_cells,
        status = ?status.status,
        width = status.world.width(),
        height = status.world.height(),
        "Broker status"
    );
    Ok(())
}

/// Toggle pause
pub async fn pause(args: &ControlArgs, config: &HaloConfig) -> Result<()> {
    let client = args.connect(config).await?;
    match call(&client, Request::TogglePause).await? {
        Response::PauseState { paused: true, turn } => info!(turn, "Paused"),
        Response::PauseState { paused: false, turn } => info!(turn, "Continuing"),
        other => bail!("unexpected answer to pause: {}", other.name()),
    }
    Ok(())
}

/// Background the broker's session
pub async fn detach(args: &ControlArgs, config: &HaloConfig) -> Result<()> {
    let client = args.connect(config).await?;
    call(&client, Request::Background).await?;
    info!("Broker in background mode; `halo run` with the same size reattaches");
    Ok(())
}

/// Save the broker's committed grid as `<width>x<height>x<turn>.pgm`
pub async fn snapshot(args: &SnapshotArgs, config: &HaloConfig) -> Result<()> {
    let status = fetch_status(&args.control, config).await?;
    if status.world.width() == 0 || status.world.height() == 0 {
        bail!("the broker has no grid yet");
    }
    let params = Params::new(status.world.width(), status.world.height(), status.turn);
    let path = args.out.join(format!("{}.pgm", params.output_name(status.turn)));
    pgm::write(&path, &status.world)?;
    info!(path = %path.display(), turn = status.turn, alive = status.alive_cells, "Snapshot saved");
    Ok(())
}

/// Shut down the broker and every worker
pub async fn kill(args: &ControlArgs, config: &HaloConfig) -> Result<()> {
    let client = args.connect(config).await?;
    call(&client, Request::Kill).await?;
    info!("Broker and workers shutting down");
    Ok(())
}
