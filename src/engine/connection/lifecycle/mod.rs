//! Container and image lifecycle: create, start, wait, stop, remove, pull.
//!
//! Daemon calls go through the [`ContainerLifecycle`] and [`ImageClient`]
//! seams. The helpers on [`EngineConnector`] compose them into the
//! guarantees the experiment strategies rely on: removal treats an already
//! absent container as success, a failed create-then-start never leaves a
//! stopped container behind, and ephemeral runs always clean up.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bollard::Docker;
use bollard::models::{ContainerCreateBody, ContainerCreateResponse, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    InspectContainerOptions, RemoveContainerOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use futures_util::TryStreamExt;
use tracing::{debug, info, warn};

use super::error_classification::{is_conflict, is_not_found, is_not_modified};
use super::exec::{ContainerExecClient, ExecOutput, ExecPrivilege};
use super::EngineConnector;
use crate::error::{ChaosError, ConfigError, ContainerError};

const READINESS_POLL_INTERVAL_MS: u64 = 100;

/// Boxed future type returned by [`ContainerLifecycle::create_container`].
pub type CreateContainerFuture<'a> = Pin<
    Box<dyn Future<Output = Result<ContainerCreateResponse, bollard::errors::Error>> + Send + 'a>,
>;

/// Boxed future type returned by the remaining lifecycle and image calls.
pub type EngineFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, bollard::errors::Error>> + Send + 'a>>;

/// Run state reported by a container inspect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerRunState {
    /// Whether the container's main process is running.
    pub running: bool,
    /// The daemon's status word, such as `created` or `exited`.
    pub status: String,
}

/// Behaviour required to manage container lifecycles.
pub trait ContainerLifecycle {
    /// Create a container from `Bollard` options and body payload.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Stop a container, killing it after `timeout_secs`.
    fn stop_container(&self, container_id: &str, timeout_secs: i32) -> EngineFuture<'_, ()>;

    /// Remove a container.
    fn remove_container(&self, container_id: &str, force: bool) -> EngineFuture<'_, ()>;

    /// Report whether a container is running.
    fn inspect_state(&self, container_id: &str) -> EngineFuture<'_, ContainerRunState>;
}

impl ContainerLifecycle for Docker {
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_> {
        Box::pin(async move { Self::create_container(self, options, config).await })
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::start_container(self, &container_id_owned, None::<StartContainerOptions>).await
        })
    }

    fn stop_container(&self, container_id: &str, timeout_secs: i32) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        let options = StopContainerOptionsBuilder::new().t(timeout_secs).build();
        Box::pin(async move { Self::stop_container(self, &container_id_owned, Some(options)).await })
    }

    fn remove_container(&self, container_id: &str, force: bool) -> EngineFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        let options = RemoveContainerOptionsBuilder::new().force(force).build();
        Box::pin(
            async move { Self::remove_container(self, &container_id_owned, Some(options)).await },
        )
    }

    fn inspect_state(&self, container_id: &str) -> EngineFuture<'_, ContainerRunState> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            let response = Self::inspect_container(
                self,
                &container_id_owned,
                None::<InspectContainerOptions>,
            )
            .await?;
            let state = response.state.unwrap_or_default();
            Ok(ContainerRunState {
                running: state.running.unwrap_or(false),
                status: state
                    .status
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
        })
    }
}

/// Behaviour required to make an image available locally.
pub trait ImageClient {
    /// Whether the image is already present.
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool>;

    /// Pull the image from its registry.
    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;
}

impl ImageClient for Docker {
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool> {
        let image_owned = String::from(image);
        Box::pin(async move {
            match Self::inspect_image(self, &image_owned).await {
                Ok(_) => Ok(true),
                Err(error) if is_not_found(&error) => Ok(false),
                Err(error) => Err(error),
            }
        })
    }

    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()> {
        let (repository, tag) = split_image_reference(image);
        let options = CreateImageOptionsBuilder::new()
            .from_image(&repository)
            .tag(&tag)
            .build();
        Box::pin(async move {
            Self::create_image(self, Some(options), None, None)
                .try_collect::<Vec<_>>()
                .await
                .map(drop)
        })
    }
}

/// Split an image reference into repository and tag, defaulting the tag to
/// `latest`. A colon inside a registry host (`host:5000/repo`) is not a tag,
/// and a `@digest` suffix is passed on as the tag.
fn split_image_reference(image: &str) -> (String, String) {
    if let Some((named, digest)) = image.split_once('@') {
        let (repository, _) = split_tag(named);
        return (repository, String::from(digest));
    }
    let (repository, tag) = split_tag(image);
    (repository, tag.unwrap_or_else(|| String::from("latest")))
}

fn split_tag(image: &str) -> (String, Option<String>) {
    let (path, last_segment) = image
        .rsplit_once('/')
        .map_or((None, image), |(path, segment)| (Some(path), segment));
    let Some((name, tag)) = last_segment.rsplit_once(':') else {
        return (String::from(image), None);
    };
    let repository = path.map_or_else(|| String::from(name), |prefix| format!("{prefix}/{name}"));
    (repository, Some(String::from(tag)))
}

/// Host settings for a helper container that joins a target's namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidecarHostConfig {
    /// Network mode, for example `container:<id>`.
    pub network_mode: Option<String>,
    /// PID mode, for example `container:<id>`.
    pub pid_mode: Option<String>,
    /// Extra kernel capabilities.
    pub cap_add: Vec<String>,
}

/// Container-creation request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateContainerRequest {
    image: String,
    name: Option<String>,
    cmd: Option<Vec<String>>,
    tty: bool,
    labels: HashMap<String, String>,
    host: SidecarHostConfig,
}

impl CreateContainerRequest {
    /// Create a request for `image`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `image` is empty or
    /// whitespace-only.
    pub fn new(image: impl Into<String>) -> Result<Self, ChaosError> {
        let image_value = image.into();
        let trimmed = image_value.trim();
        if trimmed.is_empty() {
            return Err(ChaosError::from(ConfigError::MissingRequired {
                field: String::from("image"),
            }));
        }

        Ok(Self {
            image: String::from(trimmed),
            name: None,
            cmd: None,
            tty: false,
            labels: HashMap::new(),
            host: SidecarHostConfig::default(),
        })
    }

    /// Attach an optional container name.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|value| !value.trim().is_empty());
        self
    }

    /// Attach an optional command vector.
    #[must_use]
    pub fn with_cmd(mut self, cmd: Option<Vec<String>>) -> Self {
        self.cmd = cmd;
        self
    }

    /// Allocate a pseudo-terminal so shell entrypoints stay alive.
    #[must_use]
    pub const fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Attach host settings.
    #[must_use]
    pub fn with_host(mut self, host: SidecarHostConfig) -> Self {
        self.host = host;
        self
    }

    /// Return the configured image.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Return the optional configured name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the configured host settings.
    #[must_use]
    pub const fn host(&self) -> &SidecarHostConfig {
        &self.host
    }
}

/// A throwaway container that runs one command and is then removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralRun {
    /// The container to create.
    pub container: CreateContainerRequest,
    /// Shell command executed once the container is running.
    pub command: String,
    /// Whether to remove the container afterwards, whatever the outcome.
    pub remove_after: bool,
    /// How long to wait for the container to report running.
    pub ready_timeout: Duration,
}

/// Containers a run has created and must remove even when it is cancelled.
///
/// A run registers each container it owns as soon as it exists and releases
/// it once cleanup is done. Whatever is still registered after the run's
/// future was dropped is left for the owner to [`take`](Self::take) and
/// remove.
#[derive(Debug, Default)]
pub struct PendingRemovals {
    ids: Mutex<Vec<String>>,
}

impl PendingRemovals {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a container that must not outlive the run.
    pub fn register(&self, container_id: &str) {
        self.lock().push(String::from(container_id));
    }

    /// Forget a container whose cleanup has been handled.
    pub fn release(&self, container_id: &str) {
        self.lock().retain(|id| id != container_id);
    }

    /// Drain every container still awaiting removal.
    #[must_use]
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EngineConnector {
    /// Create a container and return its id.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NameConflict` when the name is taken and
    /// `ContainerError::CreateFailed` for any other rejection.
    pub async fn create_container<C: ContainerLifecycle + ?Sized>(
        client: &C,
        request: &CreateContainerRequest,
    ) -> Result<String, ChaosError> {
        let name = request.name().unwrap_or_default();
        let response = client
            .create_container(build_create_options(request.name()), build_create_body(request))
            .await
            .map_err(|error| {
                if is_conflict(&error) {
                    ChaosError::from(ContainerError::NameConflict {
                        name: String::from(name),
                    })
                } else {
                    ChaosError::from(ContainerError::CreateFailed {
                        name: String::from(name),
                        message: error.to_string(),
                    })
                }
            })?;
        Ok(response.id)
    }

    /// Create then start a container, returning its id.
    ///
    /// A container that was created but failed to start is force-removed
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the creation errors of [`Self::create_container`] and
    /// `ContainerError::StartFailed` when the start is rejected.
    pub async fn create_and_start<C: ContainerLifecycle + ?Sized>(
        client: &C,
        request: &CreateContainerRequest,
    ) -> Result<String, ChaosError> {
        let container_id = Self::create_container(client, request).await?;
        if let Err(error) = client.start_container(&container_id).await {
            Self::discard(client, &container_id).await;
            return Err(ChaosError::from(ContainerError::StartFailed {
                container_id,
                message: error.to_string(),
            }));
        }
        info!(container_id = %container_id, image = request.image(), "started container");
        Ok(container_id)
    }

    /// Poll until the container reports running, up to `budget`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotReady` when the budget runs out or the
    /// container exits first.
    pub async fn wait_until_running<C: ContainerLifecycle + ?Sized>(
        client: &C,
        container_id: &str,
        budget: Duration,
    ) -> Result<(), ChaosError> {
        let poll_interval = Duration::from_millis(READINESS_POLL_INTERVAL_MS);
        let not_ready = || {
            ChaosError::from(ContainerError::NotReady {
                container_id: String::from(container_id),
                millis: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            })
        };

        let poll = async {
            loop {
                match client.inspect_state(container_id).await {
                    Ok(state) if state.running => return Ok(()),
                    Ok(state) if state.status == "exited" || state.status == "dead" => {
                        return Err(not_ready());
                    }
                    Ok(_) => {}
                    Err(error) if is_not_found(&error) => return Err(not_ready()),
                    Err(error) => debug!(container_id, %error, "inspect failed while waiting"),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::time::timeout(budget, poll)
            .await
            .map_err(|_| not_ready())?
    }

    /// Stop a container gracefully, then force-remove it.
    ///
    /// A container that is already gone counts as removed.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RemoveFailed` when the daemon refuses either
    /// step for a container that still exists.
    pub async fn stop_and_remove<C: ContainerLifecycle + ?Sized>(
        client: &C,
        container_id: &str,
        stop_timeout_secs: i32,
    ) -> Result<(), ChaosError> {
        match client.stop_container(container_id, stop_timeout_secs).await {
            Ok(()) => {}
            Err(error) if is_not_found(&error) => {
                debug!(container_id, "container already removed");
                return Ok(());
            }
            Err(error) if is_not_modified(&error) => {}
            Err(error) => return Err(remove_failed(container_id, &error)),
        }
        Self::force_remove(client, container_id).await
    }

    /// Force-remove a container; one that is already gone counts as removed.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RemoveFailed` when the daemon refuses.
    pub async fn force_remove<C: ContainerLifecycle + ?Sized>(
        client: &C,
        container_id: &str,
    ) -> Result<(), ChaosError> {
        match client.remove_container(container_id, true).await {
            Ok(()) => {
                info!(container_id, "removed container");
                Ok(())
            }
            Err(error) if is_not_found(&error) => Ok(()),
            Err(error) => Err(remove_failed(container_id, &error)),
        }
    }

    /// Pull `image` unless it is already present.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ImagePullFailed` when the lookup or the pull
    /// fails.
    pub async fn ensure_image<C: ImageClient + ?Sized>(
        client: &C,
        image: &str,
    ) -> Result<(), ChaosError> {
        let pull_failed = |error: bollard::errors::Error| {
            ChaosError::from(ContainerError::ImagePullFailed {
                image: String::from(image),
                message: error.to_string(),
            })
        };
        if client.image_exists(image).await.map_err(pull_failed)? {
            return Ok(());
        }
        info!(image, "pulling image");
        client.pull_image(image).await.map_err(pull_failed)
    }

    /// Create, start, and await a container, then run one command in it.
    ///
    /// When `remove_after` is set the container is force-removed afterwards
    /// regardless of the command's result. A container left behind by a
    /// failed start or readiness wait is always removed.
    ///
    /// The container stays registered in `pending` until its cleanup has
    /// run, so a caller that drops this future can still remove it.
    ///
    /// # Errors
    ///
    /// Returns any error from creation, readiness, or the exec itself.
    /// Cleanup failures are logged rather than returned.
    pub async fn execute_and_cleanup<C>(
        client: &C,
        run: &EphemeralRun,
        pending: &PendingRemovals,
    ) -> Result<ExecOutput, ChaosError>
    where
        C: ContainerLifecycle + ContainerExecClient + ?Sized,
    {
        let container_id = Self::create_and_start(client, &run.container).await?;
        pending.register(&container_id);
        if let Err(error) = Self::wait_until_running(client, &container_id, run.ready_timeout).await
        {
            Self::discard(client, &container_id).await;
            pending.release(&container_id);
            return Err(error);
        }

        let output =
            Self::exec_shell(client, &container_id, &run.command, ExecPrivilege::Default).await;
        if run.remove_after {
            Self::discard(client, &container_id).await;
        }
        pending.release(&container_id);
        output
    }

    /// Force-remove a container on a failure path, logging any error.
    pub(crate) async fn discard<C: ContainerLifecycle + ?Sized>(client: &C, container_id: &str) {
        if let Err(error) = Self::force_remove(client, container_id).await {
            warn!(container_id, %error, "failed to remove container");
        }
    }
}

fn remove_failed(container_id: &str, error: &bollard::errors::Error) -> ChaosError {
    ChaosError::from(ContainerError::RemoveFailed {
        container_id: String::from(container_id),
        message: error.to_string(),
    })
}

fn build_create_options(name: Option<&str>) -> Option<CreateContainerOptions> {
    name.filter(|value| !value.trim().is_empty())
        .map(|container_name| {
            CreateContainerOptionsBuilder::new()
                .name(container_name)
                .build()
        })
}

fn build_create_body(request: &CreateContainerRequest) -> ContainerCreateBody {
    ContainerCreateBody {
        image: Some(String::from(request.image())),
        cmd: request.cmd.clone(),
        tty: Some(request.tty),
        labels: (!request.labels.is_empty()).then(|| request.labels.clone()),
        host_config: Some(build_host_config(request.host())),
        ..ContainerCreateBody::default()
    }
}

fn build_host_config(host: &SidecarHostConfig) -> HostConfig {
    HostConfig {
        network_mode: host.network_mode.clone(),
        pid_mode: host.pid_mode.clone(),
        cap_add: (!host.cap_add.is_empty()).then(|| host.cap_add.clone()),
        ..HostConfig::default()
    }
}
