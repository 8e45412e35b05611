//! Config artifact: a settings section plus an ordered list of profiles.
//!
//! The file is JSON. Settings left as `null` are filled in by
//! [`crate::settings::resolve_section`] and written back, so the on-disk
//! shape round-trips through [`Config::load`] / [`Config::save`], unknown
//! keys included.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RockedError};

/// Root of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host-wide settings shared by all profiles.
    pub settings: SettingsSection,
    /// Profiles in declaration order.
    #[serde(default)]
    pub profiles: Vec<Profile>,
    /// Top-level keys rocked does not interpret, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw settings as stored in the config file. `None` means "detect me".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSection {
    /// IANA timezone passed to the locale layer.
    pub timezone: Option<String>,
    /// Locale such as `en_US.UTF-8`.
    pub locale: Option<String>,
    /// Application user created inside the image.
    pub user: Option<String>,
    /// Uid of the application user.
    pub userid: Option<u32>,
    /// Primary group of the application user.
    pub group: Option<String>,
    /// Gid of the primary group.
    pub groupid: Option<u32>,
    /// Directory holding templates, entry scripts and the build context.
    pub configdir: Option<PathBuf>,
    /// Root directory for profile volumes.
    pub volumedir: Option<PathBuf>,
    /// Password of the application user, consumed by the password layer.
    pub secret: Option<String>,
    /// GPU driver family: `intel`, `amd`, `nvidia` or `software`.
    pub gpu: Option<String>,
    /// Unrecognised settings.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One container sandbox definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name; the image is `rocked_<name>`.
    pub name: String,
    /// Distro directory the templates are looked up in.
    pub distro: String,
    /// Profile layers, appended after the vital layers.
    #[serde(default)]
    pub templates: Vec<String>,
    /// Base image the first layer builds `FROM`.
    pub baseimage: String,
    /// Optional entry-script template name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entryscript: Option<String>,
    /// Run-spec overrides (volumes, devices, environment, command, ...).
    #[serde(default)]
    pub run: Map<String, Value>,
    /// Unrecognised profile keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    /// Reads and parses the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path).map_err(|e| RockedError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Writes the config back, pretty-printed with four-space indentation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        std::fs::write(path, buf).map_err(|e| RockedError::io(path, e))?;
        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Looks up a profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::ProfileNotFound`] if no profile matches.
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| RockedError::ProfileNotFound {
                name: name.to_string(),
            })
    }
}

impl Profile {
    /// Returns the image name built for this profile.
    #[must_use]
    pub fn image_name(&self) -> String {
        crate::constants::image_name(&self.name)
    }
}
