//! `rocked open`: run a command in a profile container.

use std::path::Path;

use anyhow::{Context, bail};
use clap::Args;
use rocked_common::types::ContainerId;

use super::Target;
use crate::session::Session;

/// Arguments for the `open` command.
#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Profile and container id.
    #[command(flatten)]
    pub target: Target,

    /// Open a fresh container with the lowest free id.
    #[arg(short, long, conflicts_with = "id")]
    pub new: bool,

    /// Command to run instead of the profile default.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Executes the `open` command.
///
/// On success the process is replaced by the command and this does not
/// return.
///
/// # Errors
///
/// Returns an error if no display is forwarded or the container cannot be
/// prepared.
pub fn execute(args: OpenArgs, config: &Path) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    if session.settings().display.is_empty() {
        bail!("no display to forward, is DISPLAY set?");
    }
    let orchestrator = session.orchestrator(&args.target.profile)?;
    let id = if args.new {
        orchestrator.allocate_id()?
    } else {
        ContainerId::new(args.target.id)
    };
    let name = orchestrator.container_name(id);

    #[allow(clippy::print_stderr)]
    {
        eprintln!("Opening {name}");
    }
    orchestrator
        .exec(id, &args.command)
        .with_context(|| format!("failed to open {name}"))
}
