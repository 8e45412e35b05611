//! `rocked remove`: stop and remove profile containers.

use std::path::Path;

use clap::Args;
use rocked_common::types::ContainerId;

use super::Target;
use crate::session::Session;

/// Arguments for the `remove` command.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Profile and container id.
    #[command(flatten)]
    pub target: Target,

    /// Remove every container of the profile.
    #[arg(short, long, conflicts_with = "id")]
    pub all: bool,
}

/// Executes the `remove` command.
///
/// # Errors
///
/// Returns an error if a container cannot be stopped or removed.
pub fn execute(args: RemoveArgs, config: &Path) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let orchestrator = session.orchestrator(&args.target.profile)?;
    let removed = if args.all {
        orchestrator.remove_all()?.removed.len()
    } else {
        let id = ContainerId::new(args.target.id);
        orchestrator.stop(id)?;
        usize::from(orchestrator.remove(id)?.is_some())
    };

    #[allow(clippy::print_stderr)]
    {
        eprintln!("Removed {removed} container(s)");
    }
    Ok(())
}
