//! Lifecycle orchestration of one profile's containers and images.
//!
//! Every operation is idempotent with respect to its target state: stopping
//! a stopped container, removing a removed container or deleting a deleted
//! image all succeed.

use regex::Regex;
use rocked_common::config::Profile;
use rocked_common::constants::{STOP_TIMEOUT, container_name};
use rocked_common::error::{Result, RockedError};
use rocked_common::settings::Settings;
use rocked_common::types::{ContainerId, ContainerInfo, ContainerStatus, ImageId, ImageInfo};
use rocked_image::builder::{BuildOptions, ImageBuilder};
use rocked_image::render::PlaceholderRenderer;

use crate::allocate::allocate_id;
use crate::backend::ContainerRuntime;
use crate::display::xauth_commands;
use crate::exec::{default_command, reporter_invocation};
use crate::runspec::build_run_spec;

/// Privileged account that also receives the display authority.
const PRIVILEGED_USER: &str = "root";

/// Containers of a profile as found in the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerListing {
    /// Numeric ids, in runtime listing order.
    pub ids: Vec<ContainerId>,
    /// Distinct image ids those containers were created from.
    pub image_ids: Vec<ImageId>,
}

/// Result of [`Orchestrator::remove_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removal {
    /// Containers found before anything was removed.
    pub listing: ContainerListing,
    /// Ids that were actually removed.
    pub removed: Vec<ContainerId>,
}

/// Drives the container runtime on behalf of one profile.
pub struct Orchestrator<'a> {
    runtime: &'a dyn ContainerRuntime,
    settings: &'a Settings,
    profile: &'a Profile,
    image_name: String,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator for `profile`.
    #[must_use]
    pub fn new(runtime: &'a dyn ContainerRuntime, settings: &'a Settings, profile: &'a Profile) -> Self {
        Self {
            runtime,
            settings,
            profile,
            image_name: profile.image_name(),
        }
    }

    /// Returns the profile's image name.
    #[must_use]
    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    /// Returns the runtime name of container `id`.
    #[must_use]
    pub fn container_name(&self, id: ContainerId) -> String {
        container_name(&self.image_name, id.value())
    }

    /// Returns whether the profile image exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    pub fn image_exists(&self) -> Result<bool> {
        Ok(self.find_image(&self.image_name)?.is_some())
    }

    /// Builds the profile image.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::BuildFailed`] if the build did not produce an
    /// image, or any error raised while preparing it.
    pub fn build_image(&self, options: BuildOptions) -> Result<ImageId> {
        ImageBuilder::new(self.settings, self.profile).build(self.runtime, options)
    }

    /// Returns the image name, building the image first if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is missing and cannot be built.
    pub fn ensure_image(&self) -> Result<&str> {
        if !self.image_exists()? {
            tracing::info!(image = %self.image_name, "image not found, building");
            let id = self.build_image(BuildOptions::default())?;
            tracing::info!(image = %self.image_name, id = %id, "image built");
        }
        Ok(&self.image_name)
    }

    /// Creates and starts container `name` from the merged run spec.
    fn create_container(&self, name: &str) -> Result<ContainerInfo> {
        let _ = self.ensure_image()?;
        let spec = build_run_spec(self.settings, self.profile, name, &PlaceholderRenderer)?;
        tracing::info!(container = %name, spec = ?spec, "creating container");
        self.runtime.run(&spec)
    }

    /// Runs `command` (or the profile's default command) in container `id`.
    ///
    /// The container is created if it does not exist and started if it has
    /// exited. The command runs under the reporter wrapper so that the
    /// in-container supervisor tracks it. On success the calling process is
    /// replaced and this function does not return.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be prepared or the exec
    /// cannot take over the process.
    pub fn exec(&self, id: ContainerId, command: &[String]) -> Result<()> {
        let command = if command.is_empty() {
            default_command(self.profile)?
        } else {
            command.to_vec()
        };
        let name = self.container_name(id);

        let info = match self.runtime.container(&name) {
            Ok(info) => info,
            Err(RockedError::ContainerNotFound { .. }) => {
                tracing::info!(container = %name, "container not found, creating");
                self.create_container(&name)?
            }
            Err(e) => return Err(e),
        };
        if matches!(info.status, ContainerStatus::Exited | ContainerStatus::Created) {
            tracing::info!(container = %name, "starting container");
            self.runtime.start(&name)?;
        }
        self.forward_display(&name);

        let args = reporter_invocation(&self.settings.display, &command);
        tracing::info!(container = %name, cmd = ?args, "exec into container");
        self.runtime.exec_interactive(&name, &self.settings.user, &args)
    }

    /// Replays the X11 cookies inside the container.
    ///
    /// Failures are logged; the application may still reach the display
    /// through the shared socket.
    fn forward_display(&self, container: &str) {
        let commands = xauth_commands(self.settings);
        if commands.is_empty() {
            tracing::warn!(container, display = %self.settings.display, "no X11 cookie to forward");
        }
        for command in &commands {
            for user in [PRIVILEGED_USER, self.settings.user.as_str()] {
                match self.runtime.exec(container, user, command) {
                    Ok(out) if out.success() => {}
                    Ok(out) => tracing::warn!(
                        container,
                        user,
                        code = out.exit_code,
                        stderr = %out.stderr.trim(),
                        "xauth add failed"
                    ),
                    Err(e) => tracing::warn!(container, user, error = %e, "xauth add failed"),
                }
            }
        }
    }

    /// Stops container `id` if it is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime fails to stop the container.
    pub fn stop(&self, id: ContainerId) -> Result<()> {
        let name = self.container_name(id);
        let Some(info) = self.find_container(&name)? else {
            tracing::info!(container = %name, "container not found");
            return Ok(());
        };
        if info.status != ContainerStatus::Running {
            tracing::info!(container = %name, status = %info.status, "container already stopped");
            return Ok(());
        }
        tracing::info!(container = %name, "stopping container");
        self.runtime.stop(&name, STOP_TIMEOUT)?;
        self.runtime.wait_not_running(&name)
    }

    /// Removes container `id` if it has exited.
    ///
    /// Returns the id of the image the removed container referenced, or
    /// `None` if nothing was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime fails to remove the container.
    pub fn remove(&self, id: ContainerId) -> Result<Option<ImageId>> {
        let name = self.container_name(id);
        let Some(info) = self.find_container(&name)? else {
            tracing::info!(container = %name, "container already removed");
            return Ok(None);
        };
        if info.status != ContainerStatus::Exited {
            tracing::info!(container = %name, status = %info.status, "container not exited, not removing");
            return Ok(None);
        }
        tracing::info!(container = %name, "removing container");
        self.runtime.remove(&name)?;
        Ok(Some(info.image_id))
    }

    /// Rebuilds the profile image and collects the images it replaces.
    ///
    /// A missing image is simply built. Otherwise the image is rebuilt with
    /// `pull` set (and `no_cache` when `force` is set); a replaced base
    /// image and a replaced profile image are then removed.
    ///
    /// Returns the image name, or `None` if the build failed; the build log
    /// is logged at error level.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than a failed build.
    pub fn update_image(&self, force: bool) -> Result<Option<String>> {
        let options = BuildOptions {
            no_cache: force,
            pull: true,
        };
        let Some(old) = self.find_image(&self.image_name)? else {
            tracing::info!(image = %self.image_name, "image not found, building");
            return self.build_reporting_failure(options);
        };
        let old_base = self.find_image(&self.profile.baseimage)?;
        if old_base.is_none() {
            tracing::info!(image = %self.profile.baseimage, "base image not found");
        }

        let Some(name) = self.build_reporting_failure(options)? else {
            return Ok(None);
        };

        let new_base = self.find_image(&self.profile.baseimage)?;
        let new = self.runtime.image(&self.image_name)?;

        if let Some(old_base) = old_base {
            if new_base.as_ref().map(|b| &b.id) != Some(&old_base.id) {
                self.remove_image(&old_base.id, false)?;
            }
        }
        if new.id != old.id {
            self.remove_image(&old.id, false)?;
        }
        Ok(Some(name))
    }

    fn build_reporting_failure(&self, options: BuildOptions) -> Result<Option<String>> {
        match self.build_image(options) {
            Ok(id) => {
                tracing::info!(image = %self.image_name, id = %id, "image built");
                Ok(Some(self.image_name.clone()))
            }
            Err(RockedError::BuildFailed { tag, log }) => {
                tracing::error!(image = %tag, "build failed:\n{log}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Removes an image by id or name.
    ///
    /// Does nothing for an empty id, or when `only_untagged` is set and
    /// the image still has tags. An image that is already gone counts as
    /// removed and a conflict is logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns any other runtime failure.
    pub fn remove_image(&self, id: &ImageId, only_untagged: bool) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        if only_untagged {
            match self.find_image(id.as_str())? {
                None => {
                    tracing::info!(image = %id, "image already removed");
                    return Ok(());
                }
                Some(image) if !image.is_untagged() => {
                    tracing::debug!(image = %id, tags = ?image.tags, "image still tagged, kept");
                    return Ok(());
                }
                Some(_) => {}
            }
        }
        tracing::info!(image = %id, "removing image");
        match self.runtime.remove_image(id) {
            Ok(()) => Ok(()),
            Err(RockedError::ImageNotFound { .. }) => {
                tracing::info!(image = %id, "image already removed");
                Ok(())
            }
            Err(RockedError::ImageConflict { message }) => {
                tracing::warn!(image = %id, "{message}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Lists the profile's containers and the images they reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    pub fn list_containers(&self) -> Result<ContainerListing> {
        let pattern = Regex::new(&format!("^{}_([0-9]+)$", regex::escape(&self.image_name)))
            .map_err(|e| RockedError::config(format!("container name pattern: {e}")))?;
        let mut listing = ContainerListing::default();
        for container in self.runtime.list_containers(true)? {
            let Some(id) = pattern
                .captures(&container.name)
                .and_then(|caps| caps[1].parse::<ContainerId>().ok())
            else {
                continue;
            };
            listing.ids.push(id);
            if !listing.image_ids.contains(&container.image_id) {
                listing.image_ids.push(container.image_id);
            }
        }
        Ok(listing)
    }

    /// Returns the smallest id no container of the profile uses.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    pub fn allocate_id(&self) -> Result<ContainerId> {
        Ok(allocate_id(&self.list_containers()?.ids))
    }

    /// Stops every container of the profile.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub fn stop_all(&self) -> Result<()> {
        for id in self.list_containers()?.ids {
            self.stop(id)?;
        }
        Ok(())
    }

    /// Stops and removes every container of the profile.
    ///
    /// Containers that never ran are left in place and not reported as
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub fn remove_all(&self) -> Result<Removal> {
        let listing = self.list_containers()?;
        let mut removed = Vec::with_capacity(listing.ids.len());
        for &id in &listing.ids {
            self.stop(id)?;
            if self.remove(id)?.is_some() {
                removed.push(id);
            }
        }
        Ok(Removal { listing, removed })
    }

    /// Removes every container of the profile, the stale images they
    /// referenced and finally the profile image.
    ///
    /// # Errors
    ///
    /// Returns the first failure that is not a tolerated image error.
    pub fn destroy(&self) -> Result<()> {
        let Removal { listing, .. } = self.remove_all()?;
        for id in &listing.image_ids {
            self.remove_image(id, true)?;
        }
        self.remove_image(&ImageId::new(self.image_name.clone()), false)
    }

    fn find_image(&self, reference: &str) -> Result<Option<ImageInfo>> {
        match self.runtime.image(reference) {
            Ok(image) => Ok(Some(image)),
            Err(RockedError::ImageNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn find_container(&self, name: &str) -> Result<Option<ContainerInfo>> {
        match self.runtime.container(name) {
            Ok(info) => Ok(Some(info)),
            Err(RockedError::ContainerNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
