//! In-memory container runtime and profile fixtures shared by the
//! orchestrator tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use rocked_common::config::Profile;
use rocked_common::constants::{PASSWORD_LAYER, VITAL_LAYERS};
use rocked_common::error::{Result, RockedError};
use rocked_common::settings::Settings;
use rocked_common::types::{ContainerInfo, ContainerStatus, ImageId, ImageInfo, XauthCookie};
use rocked_image::builder::{BuildBackend, BuildLog, BuildRequest};
use rocked_runtime::backend::ContainerRuntime;
use rocked_runtime::exec::ExecOutput;
use rocked_runtime::runspec::RunSpec;

/// Outcome of one scripted build.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBuild {
    /// Image id announced by the log; `None` simulates a failed build.
    pub image_id: Option<String>,
    /// New id the base image resolves to after the build's pull.
    pub base_id: Option<String>,
}

/// Observable runtime state.
#[derive(Debug, Default)]
pub struct State {
    pub images: Vec<ImageInfo>,
    pub containers: Vec<ContainerInfo>,
    pub builds: VecDeque<ScriptedBuild>,
    pub build_requests: Vec<BuildRequest>,
    pub conflicts: Vec<ImageId>,
    pub runs: Vec<RunSpec>,
    pub execs: Vec<(String, String, Vec<String>)>,
    pub interactive: Vec<(String, String, Vec<String>)>,
    pub calls: Vec<String>,
}

impl State {
    fn find_image(&self, reference: &str) -> Option<usize> {
        let latest = format!("{reference}:latest");
        self.images.iter().position(|image| {
            image.id.as_str() == reference
                || image.tags.iter().any(|t| t == reference || *t == latest)
        })
    }

    /// Points `tag` at image `id`, creating the image if needed.
    pub fn tag(&mut self, id: &str, tag: &str) {
        for image in &mut self.images {
            image.tags.retain(|t| t != tag);
        }
        match self.images.iter_mut().find(|i| i.id.as_str() == id) {
            Some(image) => image.tags.push(tag.to_string()),
            None => self.images.push(ImageInfo {
                id: ImageId::new(id),
                tags: vec![tag.to_string()],
            }),
        }
    }

    pub fn add_untagged(&mut self, id: &str) {
        self.images.push(ImageInfo {
            id: ImageId::new(id),
            tags: Vec::new(),
        });
    }

    pub fn add_container(&mut self, name: &str, status: ContainerStatus, image: &str) {
        self.containers.push(ContainerInfo {
            name: name.to_string(),
            status,
            image_id: ImageId::new(image),
        });
    }

    pub fn has_image(&self, id: &str) -> bool {
        self.images.iter().any(|i| i.id.as_str() == id)
    }

    pub fn container(&self, name: &str) -> Option<&ContainerInfo> {
        self.containers.iter().find(|c| c.name == name)
    }

    fn container_mut(&mut self, name: &str) -> Result<&mut ContainerInfo> {
        self.containers
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| RockedError::ContainerNotFound {
                name: name.to_string(),
            })
    }
}

/// Runtime double keeping images and containers in memory.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    pub state: RefCell<State>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    fn record(&self, call: String) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl BuildBackend for FakeRuntime {
    fn build(&self, request: &BuildRequest) -> Result<BuildLog<'_>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(format!("build {}", request.tag));
        state.build_requests.push(request.clone());
        let script = state.builds.pop_front().unwrap_or_default();

        let mut log = vec!["Step 1/1 : FROM base\n".to_string()];
        if let Some(base) = &script.base_id {
            state.tag(base, "archlinux:latest");
        }
        if let Some(id) = &script.image_id {
            state.tag(id, &format!("{}:latest", request.tag));
            log.push(format!("Successfully built {id}\n"));
        } else {
            log.push("error: step failed\n".to_string());
        }
        Ok(Box::new(log.into_iter().map(Ok)))
    }
}

impl ContainerRuntime for FakeRuntime {
    fn image(&self, reference: &str) -> Result<ImageInfo> {
        let state = self.state.borrow();
        state
            .find_image(reference)
            .map(|i| state.images[i].clone())
            .ok_or_else(|| RockedError::ImageNotFound {
                reference: reference.to_string(),
            })
    }

    fn list_images(&self) -> Result<Vec<ImageInfo>> {
        Ok(self.state.borrow().images.clone())
    }

    fn remove_image(&self, id: &ImageId) -> Result<()> {
        self.record(format!("rmi {id}"));
        let mut state = self.state.borrow_mut();
        let index = state
            .find_image(id.as_str())
            .ok_or_else(|| RockedError::ImageNotFound {
                reference: id.to_string(),
            })?;
        let image_id = state.images[index].id.clone();
        let in_use = state.containers.iter().any(|c| c.image_id == image_id);
        if in_use || state.conflicts.contains(&image_id) {
            return Err(RockedError::ImageConflict {
                message: format!("conflict: unable to delete {image_id}"),
            });
        }
        let _ = state.images.remove(index);
        Ok(())
    }

    fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        Ok(self
            .state
            .borrow()
            .containers
            .iter()
            .filter(|c| all || c.status == ContainerStatus::Running)
            .cloned()
            .collect())
    }

    fn container(&self, name: &str) -> Result<ContainerInfo> {
        self.state.borrow_mut().container_mut(name).map(|c| c.clone())
    }

    fn run(&self, spec: &RunSpec) -> Result<ContainerInfo> {
        let image = self.image(&spec.image)?;
        self.record(format!("run {}", spec.name));
        let mut state = self.state.borrow_mut();
        state.runs.push(spec.clone());
        state.add_container(&spec.name, ContainerStatus::Running, image.id.as_str());
        Ok(state.containers.last().cloned().expect("just added"))
    }

    fn exec(&self, container: &str, user: &str, command: &[String]) -> Result<ExecOutput> {
        let mut state = self.state.borrow_mut();
        let _ = state.container_mut(container)?;
        state
            .execs
            .push((container.to_string(), user.to_string(), command.to_vec()));
        Ok(ExecOutput::default())
    }

    fn exec_interactive(&self, container: &str, user: &str, command: &[String]) -> Result<()> {
        self.state
            .borrow_mut()
            .interactive
            .push((container.to_string(), user.to_string(), command.to_vec()));
        Ok(())
    }

    fn start(&self, container: &str) -> Result<()> {
        self.record(format!("start {container}"));
        self.state.borrow_mut().container_mut(container)?.status = ContainerStatus::Running;
        Ok(())
    }

    fn stop(&self, container: &str, timeout: Duration) -> Result<()> {
        self.record(format!("stop {container} {}", timeout.as_secs()));
        self.state.borrow_mut().container_mut(container)?.status = ContainerStatus::Exited;
        Ok(())
    }

    fn wait_not_running(&self, container: &str) -> Result<()> {
        self.record(format!("wait {container}"));
        Ok(())
    }

    fn remove(&self, container: &str) -> Result<()> {
        self.record(format!("rm {container}"));
        let mut state = self.state.borrow_mut();
        let _ = state.container_mut(container)?;
        state.containers.retain(|c| c.name != container);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Writes a minimal template tree for the `arch` distro.
pub fn write_templates(config_dir: &Path) {
    let dir = config_dir.join("templates/arch");
    fs::create_dir_all(&dir).expect("mkdir");
    for layer in VITAL_LAYERS {
        fs::write(dir.join(format!("{layer}.jinja")), format!("# {layer}")).expect("write");
    }
    fs::write(dir.join("vital_base.jinja"), "FROM {{ profile.baseimage }}").expect("write");
    fs::write(dir.join("firefox.jinja"), "RUN pacman -S --noconfirm firefox").expect("write");
    fs::write(dir.join(format!("{PASSWORD_LAYER}.jinja")), "# password").expect("write");
}

pub fn settings(root: &Path, display: &str, cookies: Vec<XauthCookie>) -> Settings {
    let config_dir = root.join("config");
    write_templates(&config_dir);
    Settings {
        user: "alice".into(),
        uid: 1000,
        group: "alice".into(),
        gid: 1000,
        config_dir,
        volume_dir: root.join("volumes"),
        timezone: None,
        locale: None,
        secret: None,
        gpu: None,
        display: display.into(),
        cookies,
    }
}

pub fn profile(run: serde_json::Value) -> Profile {
    serde_json::from_value(serde_json::json!({
        "name": "firefox",
        "distro": "arch",
        "templates": ["firefox"],
        "baseimage": "archlinux:latest",
        "run": run
    }))
    .expect("profile")
}

pub fn cookie(value: &str) -> XauthCookie {
    XauthCookie {
        display: "/unix:0".into(),
        cookie: value.into(),
    }
}
