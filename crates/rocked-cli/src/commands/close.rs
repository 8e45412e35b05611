//! `rocked close`: stop profile containers.

use std::path::Path;

use clap::Args;
use rocked_common::types::ContainerId;

use super::Target;
use crate::session::Session;

/// Arguments for the `close` command.
#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Profile and container id.
    #[command(flatten)]
    pub target: Target,

    /// Stop every container of the profile.
    #[arg(short, long, conflicts_with = "id")]
    pub all: bool,
}

/// Executes the `close` command.
///
/// # Errors
///
/// Returns an error if a container cannot be stopped.
pub fn execute(args: CloseArgs, config: &Path) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let orchestrator = session.orchestrator(&args.target.profile)?;
    if args.all {
        orchestrator.stop_all()?;
    } else {
        orchestrator.stop(ContainerId::new(args.target.id))?;
    }

    #[allow(clippy::print_stderr)]
    {
        eprintln!("Closed");
    }
    Ok(())
}
