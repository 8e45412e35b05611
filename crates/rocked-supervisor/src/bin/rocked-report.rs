//! # rocked-report
//!
//! Registers the calling process (its parent, the reporter wrapper) with
//! the container's supervisor.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rocked_common::constants::{ENDPOINT_RETRY_INTERVAL, SUPERVISOR_SOCKET};
use rocked_supervisor::protocol::Request;
use rocked_supervisor::reporter;
use tracing_subscriber::EnvFilter;

/// Supervisor registration client.
#[derive(Parser, Debug)]
#[command(name = "rocked-report", version, about)]
struct Args {
    /// Registration socket, relative to the working directory.
    #[arg(long, default_value = SUPERVISOR_SOCKET)]
    socket: PathBuf,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Action {
    /// Start tracking the parent process.
    Add,
    /// Stop tracking the parent process.
    Remove,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let pid = reporter::wire_pid(nix::unistd::getppid().as_raw())?;
    let request = match args.action {
        Action::Add => Request::Add(pid),
        Action::Remove => Request::Remove(pid),
    };
    reporter::report(&args.socket, request, ENDPOINT_RETRY_INTERVAL)
        .with_context(|| format!("reporting to {}", args.socket.display()))
}
