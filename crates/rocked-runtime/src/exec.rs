//! Exec invocations inside profile containers.

use rocked_common::config::Profile;
use rocked_common::constants::REPORTER_SCRIPT;
use rocked_common::error::{Result, RockedError};
use serde_json::Value;

/// Output from a captured exec command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Returns whether the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Returns the command line that runs `command` under the reporter wrapper.
///
/// The wrapper exports `display`, registers itself with the supervisor and
/// deregisters once the command exits.
#[must_use]
pub fn reporter_invocation(display: &str, command: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(command.len() + 2);
    args.push(REPORTER_SCRIPT.to_string());
    args.push(display.to_string());
    args.extend(command.iter().cloned());
    args
}

/// Returns the profile's default exec command.
///
/// `run.command` may be a string, split like a shell word list, or a list of
/// strings used as-is.
///
/// # Errors
///
/// Returns [`RockedError::Config`] if the profile has no usable command.
pub fn default_command(profile: &Profile) -> Result<Vec<String>> {
    let command = match profile.run.get("command") {
        Some(Value::String(line)) => shlex::split(line).ok_or_else(|| {
            RockedError::config(format!(
                "profile {}: run.command `{line}` has an unterminated quote or escape",
                profile.name
            ))
        })?,
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    RockedError::config(format!(
                        "profile {}: run.command entries must be strings",
                        profile.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(RockedError::config(format!(
                "profile {}: run.command must be a string or a list",
                profile.name
            )));
        }
        None => Vec::new(),
    };
    if command.is_empty() {
        return Err(RockedError::config(format!(
            "profile {} has no default command, pass one explicitly",
            profile.name
        )));
    }
    Ok(command)
}
