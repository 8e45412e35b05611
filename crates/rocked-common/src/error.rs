//! Unified error types for the rocked workspace.
//!
//! Some variants are recoverable: `ImageNotFound` triggers a build,
//! `ContainerNotFound` triggers a create and `ImageConflict` is downgraded
//! to a warning by the garbage collector. Callers match on them instead of
//! bubbling them up.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RockedError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is missing or invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// No profile with the requested name exists in the config.
    #[error("profile not found: {name}")]
    ProfileNotFound {
        /// Requested profile name.
        name: String,
    },

    /// The runtime does not know the referenced image.
    #[error("image not found: {reference}")]
    ImageNotFound {
        /// Image name or id that was looked up.
        reference: String,
    },

    /// The runtime does not know the referenced container.
    #[error("container not found: {name}")]
    ContainerNotFound {
        /// Container name that was looked up.
        name: String,
    },

    /// An image build finished without reporting an image id.
    #[error("image {tag} could not be built")]
    BuildFailed {
        /// Tag the build was targeting.
        tag: String,
        /// Captured build log.
        log: String,
    },

    /// An image is still referenced by another image or container.
    #[error("image conflict: {message}")]
    ImageConflict {
        /// Conflict description reported by the runtime.
        message: String,
    },

    /// A run-spec override has a different type than the default it replaces.
    #[error("wrong type for run option {field}: expected {expected}, got {actual}")]
    RunSpecTypeMismatch {
        /// Run-spec field name.
        field: String,
        /// Type of the default value.
        expected: &'static str,
        /// Type of the profile override.
        actual: &'static str,
    },

    /// Several GPUs were detected and no choice could be made.
    #[error("ambiguous GPU selection between: {}", candidates.join(", "))]
    AmbiguousGpuSelection {
        /// Descriptions of the detected GPUs.
        candidates: Vec<String>,
    },

    /// A layer or volume template could not be rendered.
    #[error("template error: {message}")]
    Template {
        /// Description of the rendering failure.
        message: String,
    },

    /// The container runtime reported a failure.
    #[error("runtime error: {message}")]
    Runtime {
        /// Message reported by the runtime.
        message: String,
    },

    /// A supervisor datagram could not be encoded or decoded.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the malformed message.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl RockedError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a [`RockedError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Shorthand for a [`RockedError::Runtime`] error.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RockedError>;
