//! Layer composition.
//!
//! Every image is composed of ordered, renderable layer templates: the vital
//! prefix shared by all profiles, the profile's own layers, an optional
//! entry-point layer and the closing password layer.

use std::path::{Path, PathBuf};

use rocked_common::config::Profile;
use rocked_common::constants::{
    ENTRYPOINT_LAYER, ENTRYSCRIPT_TEMPLATE_EXT, LAYER_TEMPLATE_EXT, PASSWORD_LAYER, VITAL_LAYERS,
};

/// Ordered list of layers to render for one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPlan {
    layers: Vec<String>,
    entryscript: Option<String>,
}

impl LayerPlan {
    /// Computes the layer order for a profile.
    #[must_use]
    pub fn for_profile(profile: &Profile) -> Self {
        let mut layers: Vec<String> = VITAL_LAYERS.iter().map(ToString::to_string).collect();
        layers.extend(profile.templates.iter().cloned());
        if profile.entryscript.is_some() {
            layers.push(ENTRYPOINT_LAYER.to_string());
        }
        layers.push(PASSWORD_LAYER.to_string());

        Self {
            layers,
            entryscript: profile.entryscript.clone(),
        }
    }

    /// Layer names in build order.
    #[must_use]
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Entry-script template to render alongside the layers, if any.
    #[must_use]
    pub fn entryscript(&self) -> Option<&str> {
        self.entryscript.as_deref()
    }
}

/// Returns `<config_dir>/templates/<distro>/<layer>.jinja`.
#[must_use]
pub fn layer_template_path(config_dir: &Path, distro: &str, layer: &str) -> PathBuf {
    config_dir
        .join("templates")
        .join(distro)
        .join(format!("{layer}.{LAYER_TEMPLATE_EXT}"))
}

/// Returns `<config_dir>/entryscripts/<distro>/<name>.sh.jinja`.
#[must_use]
pub fn entryscript_template_path(config_dir: &Path, distro: &str, name: &str) -> PathBuf {
    config_dir
        .join("entryscripts")
        .join(distro)
        .join(format!("{name}.{ENTRYSCRIPT_TEMPLATE_EXT}"))
}
