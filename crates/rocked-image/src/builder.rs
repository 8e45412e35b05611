//! Image build pipeline.
//!
//! Renders the profile's layer plan into a build file inside the build
//! context, hands it to a [`BuildBackend`] and extracts the resulting image
//! id from the streamed log. No image id is ever returned unless the log
//! announced one.

use std::path::{Path, PathBuf};

use rocked_common::config::Profile;
use rocked_common::constants::{DOCKERFILE_NAME, ENTRYSCRIPT_NAME};
use rocked_common::error::{Result, RockedError};
use rocked_common::settings::Settings;
use rocked_common::types::ImageId;

use crate::context::{self, ScopedFile};
use crate::layer::{self, LayerPlan};
use crate::render::{self, LayerRenderer, PlaceholderRenderer};

/// Streamed build log: one item per chunk, each chunk one or more lines.
pub type BuildLog<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

/// Parameters of one runtime build call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Directory sent to the runtime as build context.
    pub context_dir: PathBuf,
    /// Build file inside the context.
    pub dockerfile: PathBuf,
    /// Tag applied to the built image.
    pub tag: String,
    /// Ignore cached layers.
    pub no_cache: bool,
    /// Pull newer base images.
    pub pull: bool,
    /// Remove intermediate containers even when the build fails.
    pub force_remove_intermediate: bool,
}

/// The build capability of a container runtime.
pub trait BuildBackend {
    /// Starts a build and returns its log stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the build cannot be started.
    fn build(&self, request: &BuildRequest) -> Result<BuildLog<'_>>;
}

/// Caller-controlled build flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Ignore cached layers.
    pub no_cache: bool,
    /// Pull newer base images.
    pub pull: bool,
}

/// Builds the image of one profile.
pub struct ImageBuilder<'a> {
    settings: &'a Settings,
    profile: &'a Profile,
    renderer: Box<dyn LayerRenderer + 'a>,
}

impl<'a> ImageBuilder<'a> {
    /// Creates a builder using the [`PlaceholderRenderer`].
    #[must_use]
    pub fn new(settings: &'a Settings, profile: &'a Profile) -> Self {
        Self {
            settings,
            profile,
            renderer: Box::new(PlaceholderRenderer),
        }
    }

    /// Replaces the template renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: impl LayerRenderer + 'a) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Returns the build context directory, `<config_dir>/tmp/`.
    #[must_use]
    pub fn context_dir(&self) -> PathBuf {
        self.settings.config_dir.join("tmp")
    }

    /// Builds and tags the profile image.
    ///
    /// The build file and any generated entry script are removed before
    /// returning, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::BuildFailed`] with the captured log if the
    /// runtime never announced an image id, or any error raised while
    /// rendering, writing the context, or streaming the log.
    pub fn build(&self, backend: &dyn BuildBackend, options: BuildOptions) -> Result<ImageId> {
        let tag = self.profile.image_name();
        tracing::info!(profile = %self.profile.name, tag = %tag, ?options, "building image");

        let context_dir = self.context_dir();
        context::stage_support_files(&self.settings.config_dir.join("process"), &context_dir)?;

        let ctx = render::template_context(self.settings, self.profile)?;
        let plan = LayerPlan::for_profile(self.profile);

        let _entryscript = match plan.entryscript() {
            Some(name) => Some(self.write_entryscript(name, &ctx, &context_dir)?),
            None => None,
        };

        let layers = plan
            .layers()
            .iter()
            .map(|name| self.render_layer(name, &ctx))
            .collect::<Result<Vec<_>>>()?;
        let dockerfile = ScopedFile::write(context_dir.join(DOCKERFILE_NAME), &layers.join("\n"))?;

        let request = BuildRequest {
            context_dir: context_dir.clone(),
            dockerfile: dockerfile.path().to_path_buf(),
            tag: tag.clone(),
            no_cache: options.no_cache,
            pull: options.pull,
            force_remove_intermediate: true,
        };
        let outcome = crate::buildlog::scan(backend.build(&request)?)?;

        match outcome.image_id {
            Some(id) => {
                tracing::info!(tag = %tag, image = %id, "image built");
                Ok(id)
            }
            None => {
                tracing::error!(tag = %tag, "image could not be built");
                Err(RockedError::BuildFailed {
                    tag,
                    log: outcome.log,
                })
            }
        }
    }

    fn render_layer(&self, name: &str, ctx: &serde_json::Value) -> Result<String> {
        let path = layer::layer_template_path(&self.settings.config_dir, &self.profile.distro, name);
        let rendered = self.render_file(&path, ctx)?;
        tracing::debug!(layer = name, "{rendered}");
        Ok(rendered)
    }

    fn write_entryscript(
        &self,
        name: &str,
        ctx: &serde_json::Value,
        context_dir: &Path,
    ) -> Result<ScopedFile> {
        let path =
            layer::entryscript_template_path(&self.settings.config_dir, &self.profile.distro, name);
        let script = self.render_file(&path, ctx)?;
        let file = ScopedFile::write(context_dir.join(ENTRYSCRIPT_NAME), &script)?;
        file.make_executable()?;
        tracing::debug!(entryscript = name, "entry script generated");
        Ok(file)
    }

    fn render_file(&self, path: &Path, ctx: &serde_json::Value) -> Result<String> {
        let template = std::fs::read_to_string(path).map_err(|e| RockedError::io(path, e))?;
        self.renderer.render(&template, ctx)
    }
}
