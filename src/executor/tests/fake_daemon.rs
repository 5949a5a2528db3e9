//! An in-memory container daemon and engine fixtures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, CreateExecResults, StartExecOptions, StartExecResults};
use bollard::models::{ContainerCreateBody, ContainerCreateResponse};
use bollard::query_parameters::{CreateContainerOptions, UploadToContainerOptions};
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::stream;
use rstest::fixture;
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::engine::{
    ApiVersion, ArchiveInspector, ConnectionManager, Connector, ContainerExecClient,
    ContainerFilter, ContainerLifecycle, ContainerLister, ContainerRecord, ContainerRunState,
    ContainerState, ContainerUploader, CreateContainerFuture, CreateExecFuture, EngineFuture,
    EnginePinger, ImageClient, ListContainersFuture, PingFuture, StartExecFuture,
    UploadToContainerFuture,
};
use crate::error::ChaosError;
use crate::executor::{ChaosEngine, EngineSettings};

pub const TARGET_ID: &str = "abc123def456";
pub const TARGET_NAME: &str = "web";
pub const TOOL_BIN: &str = "/opt/chaosblade/blade";
pub const SUCCESS_ENVELOPE: &str = "{\"code\":200,\"success\":true,\"result\":\"7c1f2a\"}\n";

pub type RuntimeFixture = std::io::Result<tokio::runtime::Runtime>;

#[fixture]
pub fn runtime() -> RuntimeFixture {
    tokio::runtime::Runtime::new()
}

/// A container as the fake daemon tracks it.
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: &'static str,
    pub network_mode: Option<String>,
    pub cap_add: Vec<String>,
    pub labels: Vec<(String, String)>,
}

impl FakeContainer {
    pub fn running(id: &str, name: &str) -> Self {
        Self {
            id: String::from(id),
            name: String::from(name),
            image: String::from("nginx:latest"),
            status: "running",
            network_mode: None,
            cap_add: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn exited(id: &str, name: &str) -> Self {
        Self {
            status: "exited",
            ..Self::running(id, name)
        }
    }

    fn record(&self) -> ContainerRecord {
        ContainerRecord {
            id: self.id.clone(),
            names: vec![format!("/{}", self.name)],
            image: self.image.clone(),
            state: ContainerState::from_engine(self.status),
            labels: self.labels.iter().cloned().collect(),
        }
    }
}

/// One exec session the daemon was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    pub container_id: String,
    pub command: String,
    pub user: Option<String>,
}

#[derive(Debug, Default)]
pub struct DaemonState {
    pub containers: Vec<FakeContainer>,
    pub images: Vec<String>,
    pub pulls: Vec<String>,
    pub created: Vec<FakeContainer>,
    pub removed: Vec<String>,
    pub execs: Vec<ExecRecord>,
    pub uploads: Vec<String>,
    /// Started containers exit at once instead of running.
    pub start_exits: bool,
    installed: HashSet<String>,
    next_id: usize,
}

impl DaemonState {
    fn find(&self, id: &str) -> Option<&FakeContainer> {
        self.containers.iter().find(|c| c.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut FakeContainer> {
        self.containers.iter_mut().find(|c| c.id == id)
    }

    pub fn container_named(&self, name: &str) -> Option<&FakeContainer> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn tool_commands(&self) -> Vec<&ExecRecord> {
        self.execs
            .iter()
            .filter(|exec| exec.command.starts_with(TOOL_BIN))
            .collect()
    }
}

/// What the chaos tool prints when the daemon runs it.
#[derive(Debug, Clone)]
pub struct ToolScript {
    pub stdout: String,
    pub stderr: String,
    pub delay: Option<Duration>,
}

impl Default for ToolScript {
    fn default() -> Self {
        Self {
            stdout: String::from(SUCCESS_ENVELOPE),
            stderr: String::new(),
            delay: None,
        }
    }
}

/// Cloneable handle; clones share one daemon.
#[derive(Debug, Clone, Default)]
pub struct FakeDaemon {
    state: Arc<Mutex<DaemonState>>,
    script: Arc<Mutex<ToolScript>>,
}

impl FakeDaemon {
    /// A daemon with one running target container.
    pub fn with_target() -> Self {
        let daemon = Self::default();
        daemon
            .state()
            .containers
            .push(FakeContainer::running(TARGET_ID, TARGET_NAME));
        daemon
    }

    pub fn state(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().expect("daemon state lock")
    }

    pub fn set_tool_output(&self, stdout: &str, stderr: &str) {
        let mut script = self.script.lock().expect("script lock");
        script.stdout = String::from(stdout);
        script.stderr = String::from(stderr);
    }

    pub fn set_tool_delay(&self, delay: Duration) {
        self.script.lock().expect("script lock").delay = Some(delay);
    }

    fn respond(&self, exec: &ExecRecord) -> (String, String, Option<Duration>) {
        if exec.command.starts_with("[ -e ") {
            let present = self.state().installed.contains(&exec.container_id);
            let answer = if present { "True\n" } else { "False\n" };
            return (String::from(answer), String::new(), None);
        }
        if exec.command.starts_with(TOOL_BIN) {
            let script = self.script.lock().expect("script lock").clone();
            return (script.stdout, script.stderr, script.delay);
        }
        (String::new(), String::new(), None)
    }
}

fn daemon_error(status_code: u16, message: &str) -> BollardError {
    BollardError::DockerResponseServerError {
        status_code,
        message: String::from(message),
    }
}

fn ready<'a, T: Send + 'a>(
    result: Result<T, BollardError>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, BollardError>> + Send + 'a>> {
    Box::pin(async move { result })
}

impl ContainerLister for FakeDaemon {
    fn list_containers(&self, filter: ContainerFilter) -> ListContainersFuture<'_> {
        let state = self.state();
        let records = state
            .containers
            .iter()
            .filter(|c| match &filter {
                ContainerFilter::Id(prefix) => c.id.starts_with(prefix.as_str()),
                ContainerFilter::Name(pattern) => {
                    match pattern.strip_prefix("^/").and_then(|p| p.strip_suffix('$')) {
                        Some(exact) => c.name == exact,
                        None => c.name.contains(pattern.as_str()),
                    }
                }
            })
            .map(FakeContainer::record)
            .collect();
        ready(Ok(records))
    }
}

impl ContainerLifecycle for FakeDaemon {
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_> {
        let name = options.and_then(|o| o.name).unwrap_or_default();
        let mut state = self.state();
        if state.container_named(&name).is_some() {
            return ready(Err(daemon_error(409, "container name already in use")));
        }
        state.next_id += 1;
        let host = config.host_config.unwrap_or_default();
        let container = FakeContainer {
            id: format!("sidecar{:04}", state.next_id),
            name,
            image: config.image.unwrap_or_default(),
            status: "created",
            network_mode: host.network_mode,
            cap_add: host.cap_add.unwrap_or_default(),
            labels: config.labels.unwrap_or_default().into_iter().collect(),
        };
        state.created.push(container.clone());
        let id = container.id.clone();
        state.containers.push(container);
        ready(Ok(ContainerCreateResponse {
            id,
            warnings: Vec::new(),
        }))
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let mut state = self.state();
        let status = if state.start_exits { "exited" } else { "running" };
        let result = match state.find_mut(container_id) {
            Some(container) => {
                container.status = status;
                Ok(())
            }
            None => Err(daemon_error(404, "no such container")),
        };
        ready(result)
    }

    fn stop_container(&self, container_id: &str, _timeout_secs: i32) -> EngineFuture<'_, ()> {
        let result = match self.state().find_mut(container_id) {
            Some(container) if container.status == "running" => {
                container.status = "exited";
                Ok(())
            }
            Some(_) => Err(daemon_error(304, "container already stopped")),
            None => Err(daemon_error(404, "no such container")),
        };
        ready(result)
    }

    fn remove_container(&self, container_id: &str, _force: bool) -> EngineFuture<'_, ()> {
        let mut state = self.state();
        let before = state.containers.len();
        state.containers.retain(|c| c.id != container_id);
        let result = if state.containers.len() < before {
            state.removed.push(String::from(container_id));
            Ok(())
        } else {
            Err(daemon_error(404, "no such container"))
        };
        ready(result)
    }

    fn inspect_state(&self, container_id: &str) -> EngineFuture<'_, ContainerRunState> {
        let result = self
            .state()
            .find(container_id)
            .map(|c| ContainerRunState {
                running: c.status == "running",
                status: String::from(c.status),
            })
            .ok_or_else(|| daemon_error(404, "no such container"));
        ready(result)
    }
}

impl ImageClient for FakeDaemon {
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool> {
        let present = self.state().images.iter().any(|i| i == image);
        ready(Ok(present))
    }

    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()> {
        let mut state = self.state();
        state.pulls.push(String::from(image));
        state.images.push(String::from(image));
        ready(Ok(()))
    }
}

impl ContainerExecClient for FakeDaemon {
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_> {
        let mut state = self.state();
        match state.find(container_id).map(|c| c.status) {
            Some("running") => {}
            Some(_) => return ready(Err(daemon_error(409, "container is not running"))),
            None => return ready(Err(daemon_error(404, "no such container"))),
        }
        let command = options
            .cmd
            .and_then(|argv| argv.last().cloned())
            .unwrap_or_default();
        if command.starts_with("rm -rf ") {
            state.installed.insert(String::from(container_id));
        }
        state.execs.push(ExecRecord {
            container_id: String::from(container_id),
            command,
            user: options.user,
        });
        let id = format!("exec-{}", state.execs.len() - 1);
        ready(Ok(CreateExecResults { id }))
    }

    fn start_exec(&self, exec_id: &str, _options: Option<StartExecOptions>) -> StartExecFuture<'_> {
        let index: usize = exec_id
            .trim_start_matches("exec-")
            .parse()
            .expect("exec ids are issued by the fake");
        let exec = self
            .state()
            .execs
            .get(index)
            .cloned()
            .expect("exec session should exist");
        let (stdout, stderr, delay) = self.respond(&exec);

        let mut chunks: Vec<Result<LogOutput, BollardError>> = Vec::new();
        if !stdout.is_empty() {
            chunks.push(Ok(LogOutput::StdOut {
                message: stdout.into_bytes().into(),
            }));
        }
        if !stderr.is_empty() {
            chunks.push(Ok(LogOutput::StdErr {
                message: stderr.into_bytes().into(),
            }));
        }
        Box::pin(async move {
            if let Some(pause) = delay {
                tokio::time::sleep(pause).await;
            }
            Ok(StartExecResults::Attached {
                output: Box::pin(stream::iter(chunks)),
                input: Box::pin(tokio::io::sink()),
            })
        })
    }
}

impl ContainerUploader for FakeDaemon {
    fn upload_to_container(
        &self,
        container_id: &str,
        _options: Option<UploadToContainerOptions>,
        _archive_bytes: Vec<u8>,
    ) -> UploadToContainerFuture<'_> {
        self.state().uploads.push(String::from(container_id));
        ready(Ok(()))
    }
}

impl EnginePinger for FakeDaemon {
    fn ping(&self) -> PingFuture<'_> {
        Box::pin(async { Ok(()) })
    }

    fn api_version(&self) -> ApiVersion {
        ApiVersion::client_default()
    }
}

/// Reports a fixed top-level directory for any archive.
pub struct FixedRoot;

impl ArchiveInspector for FixedRoot {
    fn root_dir(&self, _archive_path: &Utf8Path) -> Result<String, ChaosError> {
        Ok(String::from("chaosblade-1.7.2"))
    }
}

/// An engine wired to `daemon`, with the tool archive in a temp directory.
pub struct TestEngine {
    pub engine: ChaosEngine<FakeDaemon>,
    pub connects: Arc<AtomicUsize>,
    _archive_dir: TempDir,
}

impl TestEngine {
    pub fn new(daemon: &FakeDaemon, configure: impl FnOnce(&mut EngineSettings)) -> Self {
        let archive_dir = tempfile::tempdir().expect("tempdir should be created");
        let archive_path = Utf8PathBuf::from_path_buf(archive_dir.path().join("chaosblade.tar.gz"))
            .expect("tempdir path should be UTF-8");
        std::fs::write(&archive_path, b"archive-bytes").expect("archive should be written");

        let mut settings =
            EngineSettings::from_config(&AppConfig::default()).expect("defaults should be valid");
        settings.archive_path = archive_path;
        configure(&mut settings);

        let connects = Arc::new(AtomicUsize::new(0));
        let shared = daemon.clone();
        let counter = Arc::clone(&connects);
        let connector: Connector<FakeDaemon> = Box::new(
            move |_endpoint: &str, _version: ApiVersion| -> Result<FakeDaemon, ChaosError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(shared.clone())
            },
        );
        let connections =
            ConnectionManager::new("unix:///fake/docker.sock", settings.api_version, connector);

        Self {
            engine: ChaosEngine::new(connections, settings, Box::new(FixedRoot)),
            connects,
            _archive_dir: archive_dir,
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}
