//! # rocked-monitor
//!
//! Container command. Keeps the container alive while registered
//! processes run and drains them on SIGTERM.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rocked_common::constants::SUPERVISOR_SOCKET;
use rocked_supervisor::relay::ChildrenRelay;
use rocked_supervisor::server::{self, Endpoint};
use rocked_supervisor::tracked::DrainPolicy;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

/// Process supervisor of a rocked container.
#[derive(Parser, Debug)]
#[command(name = "rocked-monitor", version, about)]
struct Args {
    /// Registration socket, relative to the working directory.
    #[arg(long, default_value = SUPERVISOR_SOCKET)]
    socket: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let terminations = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let endpoint = Endpoint::bind(&args.socket)
        .with_context(|| format!("binding {}", args.socket.display()))?;
    let mut relay = ChildrenRelay::new();

    server::serve(&endpoint, &mut relay, terminations, DrainPolicy::default()).await?;
    Ok(())
}
