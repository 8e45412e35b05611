//! `rocked destroy`: remove every container and image of a profile.

use std::path::Path;

use clap::Args;

use crate::session::Session;

/// Arguments for the `destroy` command.
#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Profile name.
    pub profile: String,
}

/// Executes the `destroy` command.
///
/// # Errors
///
/// Returns an error if a container or image cannot be removed.
pub fn execute(args: DestroyArgs, config: &Path) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let orchestrator = session.orchestrator(&args.profile)?;
    orchestrator.destroy()?;

    #[allow(clippy::print_stderr)]
    {
        eprintln!("Destroyed {}", orchestrator.image_name());
    }
    Ok(())
}
