//! Domain primitive types used across the rocked workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RockedError;

/// Numeric per-profile container identifier.
///
/// The runtime-facing identity is the derived name
/// (`<image-name>_<id>`), see [`crate::constants::container_name`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerId(u32);

impl ContainerId {
    /// Creates a container id from its numeric value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = RockedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(Self)
            .map_err(|_| RockedError::config(format!("invalid container id: {s}")))
    }
}

/// Runtime-issued identifier for a container image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(String);

impl ImageId {
    /// Creates a new image ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether the id is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An image as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Image identifier.
    pub id: ImageId,
    /// Tags still pointing at this image.
    pub tags: Vec<String>,
}

impl ImageInfo {
    /// Returns whether no tag references the image any more.
    #[must_use]
    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Lifecycle status of a container as observed through the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerStatus {
    /// Created but never started.
    Created,
    /// Actively running.
    Running,
    /// Stopped after running.
    Exited,
    /// Any other runtime-specific status (paused, restarting, dead, ...).
    Other(String),
}

impl ContainerStatus {
    /// Maps a runtime status string to a status.
    #[must_use]
    pub fn from_runtime(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "exited" => Self::Exited,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container name (identity).
    pub name: String,
    /// Current status.
    pub status: ContainerStatus,
    /// Image the container was created from.
    pub image_id: ImageId,
}

/// An X11 authorization cookie forwarded into containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XauthCookie {
    /// Display the cookie authorizes, e.g. `192.168.1.4:0`.
    pub display: String,
    /// Hex-encoded MIT-MAGIC-COOKIE-1 value.
    pub cookie: String,
}
