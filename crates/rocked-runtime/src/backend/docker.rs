//! Docker Engine backend.
//!
//! Talks to the daemon API through `bollard` on a private current-thread
//! tokio runtime, so the orchestrator stays synchronous. HTTP status codes
//! map onto the workspace error taxonomy: 404 is not-found and a 409 from
//! an image removal is a conflict. Only the interactive hand-off runs the
//! `docker` binary, because it has to take over the terminal.

use std::collections::BTreeMap;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Command;
use std::time::Duration;

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{BuildInfo, ContainerCreateBody, DeviceMapping, HostConfig};
use bollard::query_parameters::{
    BuildImageOptionsBuilder, CreateContainerOptionsBuilder, InspectContainerOptions,
    ListContainersOptionsBuilder, ListImagesOptionsBuilder, RemoveContainerOptions,
    RemoveImageOptions, StartContainerOptions, StopContainerOptionsBuilder,
    WaitContainerOptionsBuilder,
};
use futures_util::{Stream, StreamExt};
use rocked_common::error::{Result, RockedError};
use rocked_common::types::{ContainerInfo, ContainerStatus, ImageId, ImageInfo};
use rocked_image::builder::{BuildBackend, BuildLog, BuildRequest};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use super::ContainerRuntime;
use crate::exec::ExecOutput;
use crate::runspec::RunSpec;

/// What a request was about, for not-found mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subject {
    Image,
    Container,
}

/// Runtime backed by the Docker Engine API.
pub struct DockerEngine {
    docker: Docker,
    runtime: Runtime,
    client: PathBuf,
}

impl DockerEngine {
    /// Connects to the local daemon (`DOCKER_HOST` or the default socket).
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::Runtime`] if the async runtime cannot be
    /// created or the client cannot be configured.
    pub fn connect() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RockedError::runtime(format!("async runtime: {e}")))?;
        let docker = {
            let _guard = runtime.enter();
            Docker::connect_with_local_defaults()
                .map_err(|e| RockedError::runtime(format!("docker connect: {e}")))?
        };
        let client = which::which("docker").unwrap_or_else(|_| PathBuf::from("docker"));
        Ok(Self {
            docker,
            runtime,
            client,
        })
    }

    fn inspect_container(&self, name: &str) -> Result<ContainerInfo> {
        let inspected = self
            .runtime
            .block_on(self.docker.inspect_container(name, None::<InspectContainerOptions>))
            .map_err(|e| classify(e, Subject::Container, name))?;
        let status = inspected
            .state
            .and_then(|state| state.status)
            .map(|status| status.to_string())
            .unwrap_or_default();
        Ok(ContainerInfo {
            name: inspected
                .name
                .map_or_else(|| name.to_string(), |n| n.trim_start_matches('/').to_string()),
            status: ContainerStatus::from_runtime(&status),
            image_id: ImageId::new(inspected.image.unwrap_or_default()),
        })
    }

    async fn exec_captured(
        &self,
        container: &str,
        user: &str,
        command: &[String],
    ) -> Result<ExecOutput> {
        let options = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            user: Some(user.to_string()),
            cmd: Some(command.to_vec()),
            ..Default::default()
        };
        let created = self
            .docker
            .create_exec(container, options)
            .await
            .map_err(|e| classify(e, Subject::Container, container))?;

        let mut output = ExecOutput::default();
        let started = self
            .docker
            .start_exec(&created.id, None::<StartExecOptions>)
            .await
            .map_err(|e| classify(e, Subject::Container, container))?;
        if let StartExecResults::Attached { output: mut stream, .. } = started {
            while let Some(chunk) = stream.next().await {
                match chunk.map_err(|e| classify(e, Subject::Container, container))? {
                    LogOutput::StdOut { message } => {
                        output.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&created.id)
            .await
            .map_err(|e| classify(e, Subject::Container, container))?;
        output.exit_code = inspected
            .exit_code
            .and_then(|code| i32::try_from(code).ok())
            .unwrap_or(-1);
        Ok(output)
    }
}

fn classify(error: BollardError, subject: Subject, reference: &str) -> RockedError {
    match error {
        BollardError::DockerResponseServerError { status_code: 404, .. } => match subject {
            Subject::Image => RockedError::ImageNotFound {
                reference: reference.to_string(),
            },
            Subject::Container => RockedError::ContainerNotFound {
                name: reference.to_string(),
            },
        },
        other => RockedError::runtime(other.to_string()),
    }
}

/// Returns the container creation body for a run spec.
///
/// # Errors
///
/// Returns [`RockedError::Serialization`] if the extra options do not fit
/// the API schema.
pub fn create_body(spec: &RunSpec) -> Result<ContainerCreateBody> {
    let body = ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        tty: Some(spec.tty),
        user: Some(spec.user.clone()),
        working_dir: Some(spec.working_dir.clone()),
        env: Some(spec.environment.clone()),
        host_config: Some(HostConfig {
            binds: Some(spec.volumes.clone()),
            devices: Some(spec.devices.iter().map(String::as_str).map(device_mapping).collect()),
            auto_remove: Some(spec.remove),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    };
    if spec.extra.is_empty() {
        return Ok(body);
    }
    let mut value = serde_json::to_value(body)?;
    apply_extra(&mut value, &spec.extra);
    Ok(serde_json::from_value(value)?)
}

fn device_mapping(device: &str) -> DeviceMapping {
    let mut parts = device.splitn(3, ':');
    let host = parts.next().unwrap_or_default().to_string();
    let container = parts.next().map_or_else(|| host.clone(), str::to_string);
    DeviceMapping {
        path_on_host: Some(host),
        path_in_container: Some(container),
        cgroup_permissions: Some(parts.next().unwrap_or("rwm").to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Container,
    Host,
}

/// Maps a run option onto its API field.
fn api_field(key: &str) -> Option<(Section, &'static str)> {
    let field = match key {
        "hostname" => (Section::Container, "Hostname"),
        "domainname" => (Section::Container, "Domainname"),
        "labels" => (Section::Container, "Labels"),
        "entrypoint" => (Section::Container, "Entrypoint"),
        "stdin_open" => (Section::Container, "OpenStdin"),
        "privileged" => (Section::Host, "Privileged"),
        "cap_add" => (Section::Host, "CapAdd"),
        "cap_drop" => (Section::Host, "CapDrop"),
        "network_mode" => (Section::Host, "NetworkMode"),
        "ipc_mode" => (Section::Host, "IpcMode"),
        "pid_mode" => (Section::Host, "PidMode"),
        "security_opt" => (Section::Host, "SecurityOpt"),
        "group_add" => (Section::Host, "GroupAdd"),
        "dns" => (Section::Host, "Dns"),
        "extra_hosts" => (Section::Host, "ExtraHosts"),
        "init" => (Section::Host, "Init"),
        "shm_size" => (Section::Host, "ShmSize"),
        "mem_limit" => (Section::Host, "Memory"),
        _ => return None,
    };
    Some(field)
}

/// Writes profile-only run options into a serialized creation body.
fn apply_extra(body: &mut Value, extra: &BTreeMap<String, Value>) {
    for (key, value) in extra {
        if key == "ports" {
            apply_ports(body, value);
            continue;
        }
        let Some((section, field)) = api_field(key) else {
            tracing::warn!(key = %key, "unsupported run option, skipped");
            continue;
        };
        let value = if matches!(key.as_str(), "shm_size" | "mem_limit") {
            let Some(bytes) = parse_size(value) else {
                tracing::warn!(key = %key, value = %value, "invalid size, skipped");
                continue;
            };
            json!(bytes)
        } else {
            value.clone()
        };
        match section {
            Section::Container => body[field] = value,
            Section::Host => body["HostConfig"][field] = value,
        }
    }
}

/// Publishes `{"<port>[/proto]": <host port or "ip:port">}` mappings.
fn apply_ports(body: &mut Value, ports: &Value) {
    let Some(ports) = ports.as_object() else {
        tracing::warn!(value = %ports, "ports must be an object, skipped");
        return;
    };
    for (container, host) in ports {
        let port = if container.contains('/') {
            container.clone()
        } else {
            format!("{container}/tcp")
        };
        let host = match host {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let binding = match host.rsplit_once(':') {
            Some((ip, port)) => json!({"HostIp": ip, "HostPort": port}),
            None => json!({"HostPort": host}),
        };
        body["ExposedPorts"][port.as_str()] = json!({});
        body["HostConfig"]["PortBindings"][port.as_str()] = json!([binding]);
    }
}

/// Parses a byte size given as a number or as `<n>[b|k|m|g]`.
fn parse_size(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let text = value.as_str()?.trim().to_ascii_lowercase();
    let (digits, unit) = match text.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => text.split_at(i),
        None => (text.as_str(), ""),
    };
    let factor: i64 = match unit.trim_end_matches('b') {
        "" => 1,
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        _ => return None,
    };
    digits.parse::<i64>().ok()?.checked_mul(factor)
}

/// Extracts the log text carried by one build message.
fn log_chunk(info: BuildInfo) -> Option<String> {
    info.stream
        .or_else(|| info.error_detail.and_then(|detail| detail.message).map(|m| m + "\n"))
}

/// Adapts the daemon's build stream to a blocking log iterator.
struct BuildStream<'a> {
    runtime: &'a Runtime,
    stream: Pin<Box<dyn Stream<Item = std::result::Result<BuildInfo, BollardError>> + 'a>>,
}

impl Iterator for BuildStream<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.runtime.block_on(self.stream.next())? {
                Ok(info) => {
                    if let Some(chunk) = log_chunk(info) {
                        return Some(Ok(chunk));
                    }
                }
                // A failing build step; the log keeps it and no marker follows.
                Err(BollardError::DockerStreamError { error }) => return Some(Ok(error + "\n")),
                Err(e) => return Some(Err(RockedError::runtime(format!("build: {e}")))),
            }
        }
    }
}

fn archive_context(dir: &Path) -> Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive
        .append_dir_all(".", dir)
        .map_err(|e| RockedError::io(dir, e))?;
    archive.into_inner().map_err(|e| RockedError::io(dir, e))
}

impl BuildBackend for DockerEngine {
    fn build(&self, request: &BuildRequest) -> Result<BuildLog<'_>> {
        let dockerfile = request
            .dockerfile
            .strip_prefix(&request.context_dir)
            .unwrap_or(&request.dockerfile)
            .to_string_lossy()
            .into_owned();
        let options = BuildImageOptionsBuilder::new()
            .dockerfile(&dockerfile)
            .t(&request.tag)
            .rm(true)
            .forcerm(request.force_remove_intermediate)
            .nocache(request.no_cache)
            .pull(if request.pull { "true" } else { "" })
            .build();
        let archive = archive_context(&request.context_dir)?;

        tracing::info!(tag = %request.tag, no_cache = request.no_cache, pull = request.pull, "starting build");
        let stream = self
            .docker
            .build_image(options, None, Some(bollard::body_full(archive.into())));
        Ok(Box::new(BuildStream {
            runtime: &self.runtime,
            stream: Box::pin(stream),
        }))
    }
}

impl ContainerRuntime for DockerEngine {
    fn image(&self, reference: &str) -> Result<ImageInfo> {
        let inspected = self
            .runtime
            .block_on(self.docker.inspect_image(reference))
            .map_err(|e| classify(e, Subject::Image, reference))?;
        Ok(ImageInfo {
            id: ImageId::new(inspected.id.unwrap_or_default()),
            tags: inspected.repo_tags.unwrap_or_default(),
        })
    }

    fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let options = ListImagesOptionsBuilder::new().all(true).build();
        let images = self
            .runtime
            .block_on(self.docker.list_images(Some(options)))
            .map_err(|e| classify(e, Subject::Image, ""))?;
        Ok(images
            .into_iter()
            .map(|image| ImageInfo {
                id: ImageId::new(image.id),
                tags: image
                    .repo_tags
                    .into_iter()
                    .filter(|tag| tag != "<none>:<none>")
                    .collect(),
            })
            .collect())
    }

    fn remove_image(&self, id: &ImageId) -> Result<()> {
        match self
            .runtime
            .block_on(self.docker.remove_image(id.as_str(), None::<RemoveImageOptions>, None))
        {
            Ok(deleted) => {
                tracing::debug!(image = %id, entries = deleted.len(), "image removed");
                Ok(())
            }
            Err(BollardError::DockerResponseServerError { status_code: 409, message }) => {
                Err(RockedError::ImageConflict { message })
            }
            Err(e) => Err(classify(e, Subject::Image, id.as_str())),
        }
    }

    fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptionsBuilder::new().all(all).build();
        let summaries = self
            .runtime
            .block_on(self.docker.list_containers(Some(options)))
            .map_err(|e| classify(e, Subject::Container, ""))?;
        let mut containers = Vec::with_capacity(summaries.len());
        for name in summaries
            .into_iter()
            .filter_map(|summary| summary.names.and_then(|names| names.into_iter().next()))
        {
            match self.inspect_container(name.trim_start_matches('/')) {
                Ok(info) => containers.push(info),
                // Removed between listing and inspection.
                Err(RockedError::ContainerNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(containers)
    }

    fn container(&self, name: &str) -> Result<ContainerInfo> {
        self.inspect_container(name)
    }

    fn run(&self, spec: &RunSpec) -> Result<ContainerInfo> {
        let body = create_body(spec)?;
        let options = CreateContainerOptionsBuilder::new().name(&spec.name).build();
        let created = self
            .runtime
            .block_on(self.docker.create_container(Some(options), body))
            .map_err(|e| classify(e, Subject::Image, &spec.image))?;
        for warning in &created.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "daemon warning");
        }
        self.start(&spec.name)?;
        self.container(&spec.name)
    }

    fn exec(&self, container: &str, user: &str, command: &[String]) -> Result<ExecOutput> {
        tracing::debug!(container, user, cmd = ?command, "exec");
        self.runtime.block_on(self.exec_captured(container, user, command))
    }

    fn exec_interactive(&self, container: &str, user: &str, command: &[String]) -> Result<()> {
        tracing::info!(container, user, cmd = ?command, "handing over to interactive exec");
        let err = Command::new(&self.client)
            .args(["exec", "--interactive", "--tty", "--user", user, container])
            .args(command)
            .exec();
        Err(RockedError::io(&self.client, err))
    }

    fn start(&self, container: &str) -> Result<()> {
        self.runtime
            .block_on(self.docker.start_container(container, None::<StartContainerOptions>))
            .map_err(|e| classify(e, Subject::Container, container))
    }

    fn stop(&self, container: &str, timeout: Duration) -> Result<()> {
        let secs = i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX);
        let options = StopContainerOptionsBuilder::new().t(secs).build();
        self.runtime
            .block_on(self.docker.stop_container(container, Some(options)))
            .map_err(|e| classify(e, Subject::Container, container))
    }

    fn wait_not_running(&self, container: &str) -> Result<()> {
        let options = WaitContainerOptionsBuilder::new().condition("not-running").build();
        self.runtime.block_on(async {
            let mut waits = Box::pin(self.docker.wait_container(container, Some(options)));
            while let Some(item) = waits.next().await {
                match item {
                    // A non-zero exit code still means the container stopped.
                    Ok(_) | Err(BollardError::DockerContainerWaitError { .. }) => {}
                    Err(e) => return Err(classify(e, Subject::Container, container)),
                }
            }
            Ok(())
        })
    }

    fn remove(&self, container: &str) -> Result<()> {
        self.runtime
            .block_on(self.docker.remove_container(container, None::<RemoveContainerOptions>))
            .map_err(|e| classify(e, Subject::Container, container))
    }

    fn is_available(&self) -> bool {
        self.runtime.block_on(self.docker.ping()).is_ok()
    }
}
