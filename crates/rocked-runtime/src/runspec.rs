//! Run specification of a profile container.
//!
//! A [`RunSpec`] starts from fixed defaults (GPU passthrough, display
//! variable, X11 and audio sockets) and is merged with the profile's `run`
//! overrides field by field:
//!
//! * list fields (`devices`, `environment`, `volumes`) are concatenated,
//!   defaults first;
//! * scalar fields (`remove`, `user`, `working_dir`) are replaced;
//! * an override whose JSON type differs from the field is skipped with a
//!   [`RockedError::RunSpecTypeMismatch`] and the default is kept;
//! * unknown keys are carried verbatim in [`RunSpec::extra`].
//!
//! The orchestrator-owned fields (name, image, command, detach, tty) are
//! reasserted after the merge and cannot be overridden.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rocked_common::config::Profile;
use rocked_common::constants::MONITOR_BIN;
use rocked_common::error::{Result, RockedError};
use rocked_common::settings::Settings;
use rocked_image::render::{self, LayerRenderer};
use serde_json::{Map, Value};

/// Keys the orchestrator owns; profile values for them are ignored.
const OWNED_FIELDS: [&str; 4] = ["name", "image", "detach", "tty"];

/// Fully merged container configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    /// Container name, `<image-name>_<id>`.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Container command; always the supervisor.
    pub command: Vec<String>,
    /// Run in the background.
    pub detach: bool,
    /// Allocate a terminal.
    pub tty: bool,
    /// Device mappings, `host:container`.
    pub devices: Vec<String>,
    /// Environment entries, `KEY=value`.
    pub environment: Vec<String>,
    /// Volume mappings, `host:container[:mode]`.
    pub volumes: Vec<String>,
    /// Remove the container when it exits.
    pub remove: bool,
    /// User the container command runs as.
    pub user: String,
    /// Working directory of the container command.
    pub working_dir: String,
    /// Profile-only options, passed through to the runtime untouched.
    pub extra: BTreeMap<String, Value>,
}

impl RunSpec {
    /// Returns the default spec for the given settings.
    ///
    /// Identity fields are left empty until [`RunSpec::reassert`].
    #[must_use]
    pub fn defaults(settings: &Settings) -> Self {
        let uid = settings.uid;
        Self {
            name: String::new(),
            image: String::new(),
            command: Vec::new(),
            detach: true,
            tty: true,
            devices: vec!["/dev/dri:/dev/dri".to_string()],
            environment: vec![format!("DISPLAY={}", settings.display)],
            volumes: vec![
                "/tmp/.X11-unix:/tmp/.X11-unix".to_string(),
                format!("/run/user/{uid}/pulse:/run/user/{uid}/pulse"),
            ],
            remove: false,
            user: settings.user.clone(),
            working_dir: format!("/home/{}", settings.user),
            extra: BTreeMap::new(),
        }
    }

    /// Merges profile overrides into the spec.
    ///
    /// Returns the overrides that were skipped; each is also logged.
    pub fn merge(&mut self, overrides: &Map<String, Value>) -> Vec<RockedError> {
        let mut skipped = Vec::new();
        for (key, value) in overrides {
            if let Err(e) = self.apply(key, value) {
                tracing::warn!(field = %key, error = %e, "run option skipped");
                skipped.push(e);
            }
        }
        skipped
    }

    fn apply(&mut self, key: &str, value: &Value) -> Result<()> {
        match key {
            "devices" => self.devices.extend(string_list(key, value)?),
            "environment" => self.environment.extend(string_list(key, value)?),
            "volumes" => self.volumes.extend(string_list(key, value)?),
            "remove" => self.remove = boolean(key, value)?,
            "user" => self.user = string(key, value)?,
            "working_dir" => self.working_dir = string(key, value)?,
            // The default exec command, not a container field.
            "command" => {}
            owned if OWNED_FIELDS.contains(&owned) => {
                tracing::debug!(field = %owned, "ignoring orchestrator-owned run option");
            }
            _ => {
                let _ = self.extra.insert(key.to_string(), value.clone());
            }
        }
        Ok(())
    }

    /// Forces the orchestrator-owned fields.
    pub fn reassert(&mut self, name: &str, image: &str) {
        self.name = name.to_string();
        self.image = image.to_string();
        self.command = vec![MONITOR_BIN.to_string()];
        self.detach = true;
        self.tty = true;
    }
}

/// Builds the run spec of one container of `profile`.
///
/// Profile volumes are rendered against the template context first and any
/// missing absolute host directory they reference is created.
///
/// # Errors
///
/// Returns an error if a volume fails to render or a host directory cannot
/// be created. Type mismatches are not errors; see [`RunSpec::merge`].
pub fn build_run_spec(
    settings: &Settings,
    profile: &Profile,
    container_name: &str,
    renderer: &dyn LayerRenderer,
) -> Result<RunSpec> {
    let mut overrides = profile.run.clone();
    if let Some(Value::Array(volumes)) = overrides.get_mut("volumes") {
        let context = render::template_context(settings, profile)?;
        for volume in volumes.iter_mut() {
            if let Value::String(spec) = volume {
                let rendered = renderer.render(spec, &context)?;
                create_host_dir(&rendered)?;
                *spec = rendered;
            }
        }
    }

    let mut spec = RunSpec::defaults(settings);
    let _ = spec.merge(&overrides);
    spec.reassert(container_name, &profile.image_name());
    Ok(spec)
}

fn create_host_dir(volume: &str) -> Result<()> {
    let Some(source) = volume.split(':').next().map(Path::new) else {
        return Ok(());
    };
    // Relative sources are named volumes managed by the runtime.
    if !source.is_absolute() || source.exists() {
        return Ok(());
    }
    fs::create_dir_all(source).map_err(|e| RockedError::io(source, e))?;
    tracing::info!(path = %source.display(), "created volume directory");
    Ok(())
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(field: &str, expected: &'static str, value: &Value) -> RockedError {
    RockedError::RunSpecTypeMismatch {
        field: field.to_string(),
        expected,
        actual: json_type(value),
    }
}

fn string_list(field: &str, value: &Value) -> Result<Vec<String>> {
    let Value::Array(items) = value else {
        return Err(mismatch(field, "list", value));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| mismatch(field, "string", item))
        })
        .collect()
}

fn string(field: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| mismatch(field, "string", value))
}

fn boolean(field: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| mismatch(field, "boolean", value))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rocked_image::render::PlaceholderRenderer;
    use serde_json::json;

    use super::*;

    fn settings(volume_dir: PathBuf) -> Settings {
        Settings {
            user: "alice".into(),
            uid: 1000,
            group: "alice".into(),
            gid: 1000,
            config_dir: PathBuf::from("/home/alice/.rocked/"),
            volume_dir,
            timezone: None,
            locale: None,
            secret: None,
            gpu: None,
            display: ":0".into(),
            cookies: Vec::new(),
        }
    }

    fn profile(run: Value) -> Profile {
        serde_json::from_value(json!({
            "name": "firefox",
            "distro": "arch",
            "templates": ["firefox"],
            "baseimage": "archlinux:latest",
            "run": run
        }))
        .expect("profile")
    }

    fn overrides(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn defaults_follow_settings() {
        let spec = RunSpec::defaults(&settings(PathBuf::from("/v")));
        assert_eq!(spec.environment, vec!["DISPLAY=:0"]);
        assert_eq!(spec.devices, vec!["/dev/dri:/dev/dri"]);
        assert_eq!(spec.volumes[1], "/run/user/1000/pulse:/run/user/1000/pulse");
        assert_eq!(spec.user, "alice");
        assert_eq!(spec.working_dir, "/home/alice");
        assert!(!spec.remove);
    }

    #[test]
    fn lists_concatenate_defaults_first() {
        let mut spec = RunSpec::defaults(&settings(PathBuf::from("/v")));
        let skipped = spec.merge(&overrides(json!({
            "volumes": ["/srv/downloads:/home/alice/Downloads"],
            "environment": ["MOZ_ENABLE_WAYLAND=0"]
        })));
        assert!(skipped.is_empty());
        assert_eq!(spec.volumes.len(), 3);
        assert_eq!(spec.volumes[0], "/tmp/.X11-unix:/tmp/.X11-unix");
        assert_eq!(spec.volumes[2], "/srv/downloads:/home/alice/Downloads");
        assert_eq!(spec.environment, vec!["DISPLAY=:0", "MOZ_ENABLE_WAYLAND=0"]);
    }

    #[test]
    fn scalars_are_replaced() {
        let mut spec = RunSpec::defaults(&settings(PathBuf::from("/v")));
        let skipped = spec.merge(&overrides(json!({"remove": true, "working_dir": "/tmp"})));
        assert!(skipped.is_empty());
        assert!(spec.remove);
        assert_eq!(spec.working_dir, "/tmp");
    }

    #[test]
    fn type_mismatch_keeps_default() {
        let mut spec = RunSpec::defaults(&settings(PathBuf::from("/v")));
        let skipped = spec.merge(&overrides(json!({
            "remove": "yes",
            "devices": "/dev/snd",
            "environment": {"LANG": "C"},
            "user": "bob"
        })));
        assert_eq!(skipped.len(), 3);
        assert!(skipped
            .iter()
            .all(|e| matches!(e, RockedError::RunSpecTypeMismatch { .. })));
        assert!(!spec.remove);
        assert_eq!(spec.devices, vec!["/dev/dri:/dev/dri"]);
        assert_eq!(spec.environment, vec!["DISPLAY=:0"]);
        assert_eq!(spec.user, "bob");
    }

    #[test]
    fn unknown_keys_pass_through() {
        let mut spec = RunSpec::defaults(&settings(PathBuf::from("/v")));
        let _ = spec.merge(&overrides(json!({"shm_size": "2g", "cap_add": ["SYS_ADMIN"]})));
        assert_eq!(spec.extra.get("shm_size"), Some(&json!("2g")));
        assert_eq!(spec.extra.get("cap_add"), Some(&json!(["SYS_ADMIN"])));
    }

    #[test]
    fn owned_fields_are_reasserted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let profile = profile(json!({
            "name": "evil",
            "image": "other",
            "detach": false,
            "tty": false,
            "command": "firefox"
        }));
        let spec = build_run_spec(
            &settings(dir.path().to_path_buf()),
            &profile,
            "rocked_firefox_0",
            &PlaceholderRenderer,
        )
        .expect("spec");
        assert_eq!(spec.name, "rocked_firefox_0");
        assert_eq!(spec.image, "rocked_firefox");
        assert_eq!(spec.command, vec![MONITOR_BIN]);
        assert!(spec.detach && spec.tty);
        assert!(spec.extra.is_empty());
    }

    #[test]
    fn volumes_are_rendered_and_host_dirs_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let volume_dir = dir.path().join("volumes/");
        let profile = profile(json!({
            "volumes": [
                "{{ settings.volumedir }}{{ profile.name }}:/home/{{ settings.user }}/.mozilla",
                "cache:/home/alice/.cache"
            ]
        }));
        let spec = build_run_spec(
            &settings(volume_dir.clone()),
            &profile,
            "rocked_firefox_0",
            &PlaceholderRenderer,
        )
        .expect("spec");

        let host = volume_dir.join("firefox");
        assert_eq!(
            spec.volumes[2],
            format!("{}:/home/alice/.mozilla", host.display())
        );
        assert!(host.is_dir());
        assert!(!Path::new("cache").exists());
    }

    #[test]
    fn undefined_volume_placeholder_is_an_error() {
        let profile = profile(json!({"volumes": ["{{ settings.nowhere }}:/data"]}));
        let result = build_run_spec(
            &settings(PathBuf::from("/v")),
            &profile,
            "rocked_firefox_0",
            &PlaceholderRenderer,
        );
        assert!(matches!(result, Err(RockedError::Template { .. })));
    }
}
