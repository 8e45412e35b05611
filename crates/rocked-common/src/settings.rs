//! Settings resolution.
//!
//! Turns the raw [`SettingsSection`] into the read-only [`Settings`] the core
//! consumes. Missing user fields are detected from the invoking account and
//! a missing GPU family is detected from `lspci -v`; everything else is
//! passed through verbatim.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::SettingsSection;
use crate::error::{Result, RockedError};
use crate::types::XauthCookie;

/// Resolved settings, serialized as the `settings` template context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Application user name.
    pub user: String,
    /// Application user id.
    #[serde(rename = "userid")]
    pub uid: u32,
    /// Primary group name.
    pub group: String,
    /// Primary group id.
    #[serde(rename = "groupid")]
    pub gid: u32,
    /// Config directory (templates, entry scripts, build context).
    #[serde(rename = "configdir")]
    pub config_dir: PathBuf,
    /// Volume root directory.
    #[serde(rename = "volumedir")]
    pub volume_dir: PathBuf,
    /// Timezone, if configured.
    pub timezone: Option<String>,
    /// Locale, if configured.
    pub locale: Option<String>,
    /// User password, if configured.
    pub secret: Option<String>,
    /// GPU driver family, if known.
    pub gpu: Option<String>,
    /// Display address containers connect to.
    pub display: String,
    /// X11 cookies forwarded into containers.
    pub cookies: Vec<XauthCookie>,
}

impl Settings {
    /// Builds settings from a fully resolved section.
    ///
    /// Display and cookies start empty; see [`Settings::with_display`].
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::Config`] naming the first missing user field.
    pub fn from_section(section: &SettingsSection) -> Result<Self> {
        fn required<T: Clone>(value: Option<&T>, key: &str) -> Result<T> {
            value
                .cloned()
                .ok_or_else(|| RockedError::config(format!("setting `{key}` is not set")))
        }

        Ok(Self {
            user: required(section.user.as_ref(), "user")?,
            uid: required(section.userid.as_ref(), "userid")?,
            group: required(section.group.as_ref(), "group")?,
            gid: required(section.groupid.as_ref(), "groupid")?,
            config_dir: required(section.configdir.as_ref(), "configdir")?,
            volume_dir: required(section.volumedir.as_ref(), "volumedir")?,
            timezone: section.timezone.clone(),
            locale: section.locale.clone(),
            secret: section.secret.clone(),
            gpu: section.gpu.clone(),
            display: String::new(),
            cookies: Vec::new(),
        })
    }

    /// Attaches the forwarded display address and its cookies.
    #[must_use]
    pub fn with_display(mut self, display: String, cookies: Vec<XauthCookie>) -> Self {
        self.display = display;
        self.cookies = cookies;
        self
    }
}

/// Picks one GPU when detection finds several.
///
/// Implemented by whoever can ask the user; the core never prompts itself.
pub trait GpuChoice {
    /// Returns the index of the chosen candidate, or `None` to give up.
    fn choose(&self, candidates: &[String]) -> Option<usize>;
}

/// A [`GpuChoice`] that never decides.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGpuChoice;

impl GpuChoice for NoGpuChoice {
    fn choose(&self, _candidates: &[String]) -> Option<usize> {
        None
    }
}

/// Fills every `None` field that can be detected.
///
/// Returns `true` when the section changed and should be written back.
///
/// # Errors
///
/// Returns an error if the invoking user cannot be looked up, or
/// [`RockedError::AmbiguousGpuSelection`] if several GPUs were found and
/// `gpu_choice` declined to pick one.
pub fn resolve_section(section: &mut SettingsSection, gpu_choice: &dyn GpuChoice) -> Result<bool> {
    let mut updated = false;

    let user_missing = section.user.is_none()
        || section.userid.is_none()
        || section.group.is_none()
        || section.groupid.is_none()
        || section.configdir.is_none()
        || section.volumedir.is_none();
    if user_missing {
        detect_user(section)?;
        updated = true;
    }

    if section.gpu.is_none() {
        match lspci_output() {
            Some(output) => {
                section.gpu = resolve_gpu(&output, gpu_choice)?;
                updated |= section.gpu.is_some();
            }
            None => tracing::warn!("lspci unavailable, GPU left undetected"),
        }
    }

    Ok(updated)
}

fn detect_user(section: &mut SettingsSection) -> Result<()> {
    use nix::unistd::{Group, Uid, User};

    let user = User::from_uid(Uid::current())
        .map_err(|e| RockedError::config(format!("user lookup failed: {e}")))?
        .ok_or_else(|| RockedError::config("invoking user has no passwd entry"))?;
    let group = Group::from_gid(user.gid)
        .map_err(|e| RockedError::config(format!("group lookup failed: {e}")))?
        .map_or_else(|| user.gid.to_string(), |g| g.name);

    tracing::info!(user = %user.name, uid = user.uid.as_raw(), "detected user");
    section.userid = Some(user.uid.as_raw());
    section.groupid = Some(user.gid.as_raw());
    section.configdir = Some(user.dir.join(".rocked/"));
    section.volumedir = Some(user.dir.join("rocked/"));
    section.group = Some(group);
    section.user = Some(user.name);
    Ok(())
}

fn lspci_output() -> Option<String> {
    let output = std::process::Command::new("lspci").arg("-v").output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
}

static VGA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-f0-9]{2}:[a-f0-9]{2}\.[a-f0-9] VGA compatible controller: (.*\)).*\[VGA controller\]\)",
    )
    .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Extracts the VGA controller descriptions from `lspci -v` output.
#[must_use]
pub fn parse_gpus(lspci: &str) -> Vec<String> {
    lspci
        .lines()
        .filter_map(|line| VGA_LINE.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Maps a controller description to a driver family.
#[must_use]
pub fn classify_gpu(description: &str) -> &'static str {
    if description.contains("Intel") {
        "intel"
    } else if description.contains("AMD") || description.contains("ATI") {
        "amd"
    } else if description.contains("NVIDIA") {
        "nvidia"
    } else {
        "software"
    }
}

/// Resolves the GPU family from `lspci -v` output.
///
/// # Errors
///
/// Returns [`RockedError::AmbiguousGpuSelection`] if several GPUs are present
/// and `choice` does not pick one.
pub fn resolve_gpu(lspci: &str, choice: &dyn GpuChoice) -> Result<Option<String>> {
    let gpus = parse_gpus(lspci);
    let picked = match gpus.len() {
        0 => return Ok(None),
        1 => &gpus[0],
        _ => {
            let index = choice
                .choose(&gpus)
                .filter(|&i| i < gpus.len())
                .ok_or_else(|| RockedError::AmbiguousGpuSelection {
                    candidates: gpus.clone(),
                })?;
            &gpus[index]
        }
    };
    let family = classify_gpu(picked);
    tracing::info!(gpu = %picked, family, "detected GPU");
    Ok(Some(family.to_string()))
}
