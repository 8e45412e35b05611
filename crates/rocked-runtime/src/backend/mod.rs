//! Container runtime abstraction.
//!
//! The orchestrator only talks to a [`ContainerRuntime`]. The production
//! implementation talks to the Docker Engine API; tests substitute an
//! in-memory runtime.

pub mod docker;

use std::time::Duration;

use rocked_common::error::Result;
use rocked_common::types::{ContainerInfo, ImageId, ImageInfo};
use rocked_image::builder::BuildBackend;

use crate::exec::ExecOutput;
use crate::runspec::RunSpec;

/// The container runtime capabilities rocked relies on.
///
/// Lookups report absence with the dedicated not-found errors so that
/// callers can recover from them.
pub trait ContainerRuntime: BuildBackend {
    /// Returns an image by name or id.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::ImageNotFound`](rocked_common::error::RockedError::ImageNotFound)
    /// if the runtime does not know the image.
    fn image(&self, reference: &str) -> Result<ImageInfo>;

    /// Lists every image with its tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn list_images(&self) -> Result<Vec<ImageInfo>>;

    /// Removes an image.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` if it is already gone and `ImageConflict` if
    /// it is still referenced.
    fn remove_image(&self, id: &ImageId) -> Result<()>;

    /// Lists containers; stopped ones only when `all` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>>;

    /// Returns a container by name.
    ///
    /// # Errors
    ///
    /// Returns `ContainerNotFound` if no such container exists.
    fn container(&self, name: &str) -> Result<ContainerInfo>;

    /// Creates and starts a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created.
    fn run(&self, spec: &RunSpec) -> Result<ContainerInfo>;

    /// Runs a command in a running container and captures its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be started.
    fn exec(&self, container: &str, user: &str, command: &[String]) -> Result<ExecOutput>;

    /// Replaces the calling process with an interactive exec.
    ///
    /// Only returns on failure.
    ///
    /// # Errors
    ///
    /// Returns the reason the exec could not take over the process.
    fn exec_interactive(&self, container: &str, user: &str, command: &[String]) -> Result<()>;

    /// Starts a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    fn start(&self, container: &str) -> Result<()>;

    /// Stops a container, killing it after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be stopped.
    fn stop(&self, container: &str, timeout: Duration) -> Result<()>;

    /// Blocks until the container is no longer running.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn wait_not_running(&self, container: &str) -> Result<()>;

    /// Removes a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be removed.
    fn remove(&self, container: &str) -> Result<()>;

    /// Returns whether the runtime is usable on this host.
    fn is_available(&self) -> bool;
}

/// Connects the runtime used by the CLI.
///
/// # Errors
///
/// Returns an error if no Docker client can be set up.
pub fn connect_runtime() -> Result<Box<dyn ContainerRuntime>> {
    Ok(Box::new(docker::DockerEngine::connect()?))
}
