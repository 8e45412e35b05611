//! CLI command definitions and dispatch.

pub mod close;
pub mod destroy;
pub mod open;
pub mod remove;
pub mod setup;
pub mod update;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rocked_common::constants::DEFAULT_CONFIG_FILE;

/// Runs GUI applications in per-profile container sandboxes.
#[derive(Parser, Debug)]
#[command(name = "rocked", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the config file.
    #[arg(long, global = true, env = "ROCKED_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the settings and build the profile image if it is missing.
    Setup(setup::SetupArgs),
    /// Run a command in a profile container, creating it if needed.
    Open(open::OpenArgs),
    /// Stop profile containers.
    Close(close::CloseArgs),
    /// Stop and remove profile containers.
    Remove(remove::RemoveArgs),
    /// Rebuild the profile image and drop the images it replaces.
    Update(update::UpdateArgs),
    /// Remove every container and image of a profile.
    Destroy(destroy::DestroyArgs),
}

/// Profile and container id shared by the per-container commands.
#[derive(Args, Debug)]
pub struct Target {
    /// Profile name.
    pub profile: String,

    /// Container id within the profile.
    #[arg(short, long, default_value_t = 0)]
    pub id: u32,
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Setup(args) => setup::execute(args, &cli.config),
        Command::Open(args) => open::execute(args, &cli.config),
        Command::Close(args) => close::execute(args, &cli.config),
        Command::Remove(args) => remove::execute(args, &cli.config),
        Command::Update(args) => update::execute(args, &cli.config),
        Command::Destroy(args) => destroy::execute(args, &cli.config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rocked").chain(args.iter().copied()))
    }

    #[test]
    fn open_defaults_to_container_zero() {
        let cli = parse(&["open", "firefox"]).unwrap();
        let Command::Open(args) = cli.command else {
            unreachable!("parsed as open");
        };
        assert_eq!(args.target.profile, "firefox");
        assert_eq!(args.target.id, 0);
        assert!(!args.new);
        assert!(args.command.is_empty());
    }

    #[test]
    fn open_takes_trailing_command() {
        let cli = parse(&["open", "firefox", "-i", "2", "firefox", "--private-window"]).unwrap();
        let Command::Open(args) = cli.command else {
            unreachable!("parsed as open");
        };
        assert_eq!(args.target.id, 2);
        assert_eq!(args.command, vec!["firefox", "--private-window"]);

        let cli = parse(&["open", "firefox", "--", "sh", "-c", "true"]).unwrap();
        let Command::Open(args) = cli.command else {
            unreachable!("parsed as open");
        };
        assert_eq!(args.command, vec!["sh", "-c", "true"]);
    }

    #[test]
    fn new_is_open_only() {
        assert!(parse(&["open", "firefox", "--new"]).is_ok());
        assert!(parse(&["open", "firefox", "-n", "-i", "3"]).is_err());
        assert!(parse(&["close", "firefox", "--new"]).is_err());
        assert!(parse(&["update", "firefox", "-n"]).is_err());
    }

    #[test]
    fn all_is_close_and_remove_only() {
        assert!(parse(&["close", "firefox", "--all"]).is_ok());
        assert!(parse(&["remove", "firefox", "-a"]).is_ok());
        assert!(parse(&["remove", "firefox", "-a", "-i", "1"]).is_err());
        assert!(parse(&["update", "firefox", "--all"]).is_err());
    }

    #[test]
    fn force_is_update_only() {
        let cli = parse(&["update", "firefox", "-f"]).unwrap();
        assert!(matches!(cli.command, Command::Update(ref args) if args.force));
        assert!(parse(&["close", "firefox", "--force"]).is_err());
        assert!(parse(&["destroy", "firefox", "-f"]).is_err());
    }

    #[test]
    fn image_commands_reject_id() {
        assert!(parse(&["destroy", "firefox"]).is_ok());
        assert!(parse(&["destroy", "firefox", "-i", "1"]).is_err());
        assert!(parse(&["update", "firefox", "-f"]).is_ok());
        assert!(parse(&["update", "firefox", "--id", "1"]).is_err());
    }

    #[test]
    fn command_is_open_only() {
        assert!(parse(&["close", "firefox", "xterm"]).is_err());
        assert!(parse(&["remove", "firefox", "--", "xterm"]).is_err());
    }

    #[test]
    fn profile_is_required() {
        assert!(parse(&["open"]).is_err());
        assert!(parse(&["setup"]).is_err());
    }

    #[test]
    fn config_path_is_global() {
        let cli = parse(&["close", "firefox", "--config", "/tmp/rocked.json"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/rocked.json"));
    }
}
