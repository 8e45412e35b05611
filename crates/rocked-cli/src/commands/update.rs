//! `rocked update`: rebuild the profile image.

use std::path::Path;

use anyhow::bail;
use clap::Args;

use crate::session::Session;

/// Arguments for the `update` command.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Profile name.
    pub profile: String,

    /// Rebuild without the layer cache.
    #[arg(short, long)]
    pub force: bool,
}

/// Executes the `update` command.
///
/// # Errors
///
/// Returns an error if the build fails or a replaced image cannot be
/// removed.
pub fn execute(args: UpdateArgs, config: &Path) -> anyhow::Result<()> {
    let session = Session::open(config)?;
    let orchestrator = session.orchestrator(&args.profile)?;
    tracing::debug!(profile = %args.profile, force = args.force, "updating image");
    let Some(image) = orchestrator.update_image(args.force)? else {
        bail!("failed to build image {}", orchestrator.image_name());
    };

    #[allow(clippy::print_stderr)]
    {
        eprintln!("Image {image} is up to date");
    }
    Ok(())
}
