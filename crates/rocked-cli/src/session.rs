//! Per-invocation state shared by the commands.
//!
//! Loads the config, fills in detectable settings (asking on stdin when
//! several GPUs are present), writes the config back when it changed, and
//! attaches the forwarded display.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, bail};
use rocked_common::config::Config;
use rocked_common::settings::{self, GpuChoice, Settings};
use rocked_runtime::backend::{self, ContainerRuntime};
use rocked_runtime::display;
use rocked_runtime::orchestrator::Orchestrator;

/// Loaded config, resolved settings and the container runtime.
pub struct Session {
    config: Config,
    settings: Settings,
    runtime: Box<dyn ContainerRuntime>,
}

impl Session {
    /// Loads the config at `path` and prepares the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded, resolved or saved,
    /// or if the container runtime is unavailable.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let mut config = Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        let updated = settings::resolve_section(&mut config.settings, &StdinGpuChoice)
            .context("failed to resolve settings")?;
        if updated {
            config
                .save(path)
                .with_context(|| format!("failed to save config {}", path.display()))?;
            tracing::info!(path = %path.display(), "config updated");
        } else {
            tracing::debug!(path = %path.display(), "config loaded");
        }

        let (display, cookies) = match display::forward_from_env() {
            Ok(forwarded) => forwarded,
            Err(e) => {
                tracing::warn!(error = %e, "display not forwarded");
                (String::new(), Vec::new())
            }
        };
        let settings = Settings::from_section(&config.settings)?.with_display(display, cookies);

        let runtime = backend::connect_runtime()?;
        if !runtime.is_available() {
            bail!("container runtime is not available");
        }
        Ok(Self {
            config,
            settings,
            runtime,
        })
    }

    /// Returns the resolved settings.
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns an orchestrator for `profile`.
    ///
    /// # Errors
    ///
    /// Returns an error if no profile has that name.
    pub fn orchestrator(&self, profile: &str) -> anyhow::Result<Orchestrator<'_>> {
        let profile = self.config.profile(profile)?;
        Ok(Orchestrator::new(self.runtime.as_ref(), &self.settings, profile))
    }
}

/// Asks on the terminal which GPU to configure.
struct StdinGpuChoice;

impl GpuChoice for StdinGpuChoice {
    #[allow(clippy::print_stderr)]
    fn choose(&self, candidates: &[String]) -> Option<usize> {
        eprintln!("Several GPUs found:");
        for (i, gpu) in candidates.iter().enumerate() {
            eprintln!("  [{i}] {gpu}");
        }
        eprint!("Select GPU: ");
        let _ = io::stderr().flush();

        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line).ok()?;
        parse_choice(&line, candidates.len())
    }
}

fn parse_choice(line: &str, count: usize) -> Option<usize> {
    line.trim().parse::<usize>().ok().filter(|&i| i < count)
}
