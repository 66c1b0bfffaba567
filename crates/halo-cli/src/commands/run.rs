//! `halo run`: submit a run, report progress, save the result
//!
//! Ctrl+C does not stop the run. It puts the broker in background mode and
//! exits; running the same command again reattaches and resumes.

use super::{call, ControlArgs};
use crate::config::HaloConfig;
use anyhow::{bail, Context, Result};
use clap::Args;
use halo_core::{pgm, Params};
use halo_transport::{Request, Response, RpcClient, RunReport, RunRequest};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Interval between progress reports
const STATUS_INTERVAL: Duration = Duration::from_secs(2);

/// Arguments for `halo run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub control: ControlArgs,

    /// Grid width
    #[arg(short = 'W', long, default_value = "512")]
    pub width: usize,

    /// Grid height
    #[arg(short = 'H', long, default_value = "512")]
    pub height: usize,

    /// Turns to compute
    #[arg(short, long, default_value = "100")]
    pub turns: u64,

    /// Directory holding `<width>x<height>.pgm`
    #[arg(long, default_value = "images")]
    pub images: PathBuf,

    /// Directory the final grid is written to
    #[arg(long, default_value = "out")]
    pub out: PathBuf,
}

impl RunArgs {
    fn params(&self) -> Params {
        Params::new(self.width, self.height, self.turns)
    }

    fn input_path(&self) -> PathBuf {
        self.images.join(format!("{}.pgm", self.params().input_name()))
    }

    fn output_path(&self, turn: u64) -> PathBuf {
        self.out.join(format!("{}.pgm", self.params().output_name(turn)))
    }
}

/// Submit the run and wait for it, detaching on Ctrl+C
pub async fn run(args: RunArgs, config: &HaloConfig) -> Result<()> {
    let params = args.params();
    let input = args.input_path();
    let world = pgm::read(&input, params.image_width, params.image_height)
        .with_context(|| format!("failed to load {}", input.display()))?;
    info!(
        path = %input.display(),
        alive = world.alive_count(),
        turns = params.turns,
        "Loaded initial grid"
    );

    let client = args.control.connect(config).await?;
    let submit = call(&client, Request::Run(RunRequest { params, world }));
    tokio::pin!(submit);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    // The first tick fires immediately
    ticker.tick().await;

    let report = loop {
        tokio::select! {
            response = &mut submit => match response? {
                Response::Completed(report) => break report,
                other => bail!("unexpected answer to run: {}", other.name()),
            },
            _ = ticker.tick() => report_progress(&client, params.turns).await,
            signal = &mut ctrl_c => {
                signal.context("failed to listen for Ctrl+C")?;
                call(&client, Request::Background).await?;
                info!("Detached; the broker keeps the run, rerun `halo run` to resume");
                return Ok(());
            }
        }
    };

    save(&args, &report)
}

async fn report_progress(client: &RpcClient, turns: u64) {
    match call(client, Request::Status).await {
        Ok(Response::Status(status)) => info!(
            turn = status.turn,
            turns,
            alive = status.alive_cells,
            status = ?status.status,
            "Progress"
        ),
        Ok(other) => warn!(response = other.name(), "Unexpected answer to status"),
        Err(e) => warn!(error = %e, "Status poll failed"),
    }
}

fn save(args: &RunArgs, report: &RunReport) -> Result<()> {
    let path = args.output_path(report.turn);
    pgm::write(&path, &report.world)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        turn = report.turn,
        alive = report.alive_cells,
        "Run complete"
    );
    Ok(())
}
