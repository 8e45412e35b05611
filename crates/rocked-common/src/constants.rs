//! System-wide constants and naming conventions.

use std::time::Duration;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Prefix of every image built for a profile.
pub const IMAGE_PREFIX: &str = "rocked_";

/// Layers prepended to every profile, in build order.
pub const VITAL_LAYERS: [&str; 5] = [
    "vital_base",
    "vital_locale",
    "vital_user",
    "vital_pulse",
    "vital_mesa",
];

/// Layer appended when the profile declares an entry script.
pub const ENTRYPOINT_LAYER: &str = "vital_entrypoint";

/// Layer that always closes the build.
pub const PASSWORD_LAYER: &str = "vital_password";

/// Extension of layer templates.
pub const LAYER_TEMPLATE_EXT: &str = "jinja";

/// Extension of entry-script templates.
pub const ENTRYSCRIPT_TEMPLATE_EXT: &str = "sh.jinja";

/// File name of the generated build file inside the build context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// File name of the rendered entry script inside the build context.
pub const ENTRYSCRIPT_NAME: &str = "docker-entrypoint.sh";

/// Supervisor binary, also the default container command.
pub const MONITOR_BIN: &str = "rocked-monitor";

/// Registrant binary used by the reporter wrapper.
pub const REPORT_BIN: &str = "rocked-report";

/// Wrapper script that registers an exec'd process with the supervisor.
pub const REPORTER_SCRIPT: &str = "rocked-reporter.sh";

/// Supervisor endpoint, relative to the container working directory.
pub const SUPERVISOR_SOCKET: &str = "socket";

/// Grace period granted to a container on stop.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Watchdog poll interval while the supervisor drains.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Watchdog poll count before escalating to a forceful signal.
pub const DRAIN_TICKS: u32 = 500;

/// Poll interval of a registrant waiting for the supervisor endpoint.
pub const ENDPOINT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Returns the image name for a profile.
#[must_use]
pub fn image_name(profile: &str) -> String {
    format!("{IMAGE_PREFIX}{profile}")
}

/// Returns the container name for a profile image and numeric id.
#[must_use]
pub fn container_name(image_name: &str, id: u32) -> String {
    format!("{image_name}_{id}")
}
