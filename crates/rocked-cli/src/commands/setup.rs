//! `rocked setup`: resolve the settings and build the profile image.

use std::path::Path;

use clap::Args;

use crate::session::Session;

/// Arguments for the `setup` command.
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Profile name.
    pub profile: String,
}

/// Executes the `setup` command.
///
/// # Errors
///
/// Returns an error if the settings cannot be resolved or the image
/// cannot be built.
pub fn execute(args: SetupArgs, config: &Path) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let orchestrator = session.orchestrator(&args.profile)?;
    let image = orchestrator.ensure_image()?;

    #[allow(clippy::print_stderr)]
    {
        eprintln!("Image {image} is ready");
    }
    Ok(())
}
