//! Experiment execution: strategy selection, command lines, and outcomes.
//!
//! [`ChaosEngine`] is the entry point. It validates the request, obtains the
//! shared daemon connection, and dispatches on the fault category:
//!
//! - `cpu`, `mem`, `disk`, `process`, `file`: the tool is deployed into the
//!   target container and run there as root.
//! - `network`: the tool runs from a sidecar container sharing the target's
//!   network namespace with `NET_ADMIN`.
//! - `container`: the target container itself is acted on.
//!
//! Every path ends in an [`ExecutionOutcome`]; errors never escape.

mod command;
mod container_remove;
mod in_container;
mod locks;
mod request;
mod response;
mod settings;
mod sidecar;

#[cfg(test)]
pub(crate) mod tests;

use bollard::Docker;
use tracing::{Instrument, debug, info, info_span, warn};

pub use command::{DestroyForm, create_command, destroy_command};
pub use request::{ExperimentRequest, FaultCategory, Phase};
pub use response::{ErrorCode, ExecutionOutcome, ResponseDecoder};
pub use settings::EngineSettings;
pub use sidecar::{SIDECAR_LABEL, TARGET_LABEL, sidecar_name};

use in_container::InContainerStrategy;
use locks::SidecarLocks;
use sidecar::SidecarStrategy;

use crate::config::AppConfig;
use crate::engine::{
    ArchiveInspector, ConnectionManager, Connector, EngineClient, EngineConnector,
    PendingRemovals, SocketResolver, TarArchiveInspector,
};
use crate::error::ChaosError;

/// Experiment flag names understood by the engine.
pub mod flags {
    /// Target container id; wins over the name.
    pub const CONTAINER_ID: &str = "container-id";
    /// Target container name.
    pub const CONTAINER_NAME: &str = "container-name";
    /// Daemon endpoint for the first connection of the process.
    pub const DOCKER_ENDPOINT: &str = "docker-endpoint";
    /// Sidecar image repository.
    pub const IMAGE_REPO: &str = "image-repo";
    /// Sidecar image tag.
    pub const IMAGE_VERSION: &str = "image-version";
    /// Host path of the tool archive.
    pub const BLADE_TAR_FILE: &str = "blade-tar-file";
    /// Redeploy the tool even when it is already installed.
    pub const BLADE_OVERRIDE: &str = "blade-override";
    /// Kill rather than stop on `container remove`.
    pub const FORCE: &str = "force";
}

/// Runs experiment steps against one container engine.
pub struct ChaosEngine<C> {
    connections: ConnectionManager<C>,
    settings: EngineSettings,
    inspector: Box<dyn ArchiveInspector>,
    sidecar_locks: SidecarLocks,
}

impl ChaosEngine<Docker> {
    /// Build an engine for the configured Docker endpoint.
    ///
    /// No connection is made until the first experiment runs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the configuration does not yield valid
    /// [`EngineSettings`].
    pub fn from_config<E: mockable::Env>(config: &AppConfig, env: &E) -> Result<Self, ChaosError> {
        let settings = EngineSettings::from_config(config)?;
        let resolver = SocketResolver::new(env);
        let endpoint =
            EngineConnector::resolve_socket(config.docker_endpoint.as_deref(), &resolver);
        let connector: Connector<Docker> = Box::new(EngineConnector::connect);
        let connections = ConnectionManager::new(endpoint, settings.api_version, connector);
        Ok(Self::new(connections, settings, Box::new(TarArchiveInspector)))
    }
}

impl<C: EngineClient> ChaosEngine<C> {
    /// Assemble an engine from its parts.
    #[must_use]
    pub fn new(
        connections: ConnectionManager<C>,
        settings: EngineSettings,
        inspector: Box<dyn ArchiveInspector>,
    ) -> Self {
        Self {
            connections,
            settings,
            inspector,
            sidecar_locks: SidecarLocks::new(),
        }
    }

    /// The settings this engine runs with.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one experiment step to completion or until the operation deadline.
    ///
    /// Throwaway containers still alive when the deadline cancels the step
    /// are removed before the outcome is returned.
    pub async fn execute(&self, request: &ExperimentRequest) -> ExecutionOutcome {
        let span = info_span!(
            "experiment",
            uid = request.experiment_id().unwrap_or("-"),
            target = request.target(),
            action = request.action(),
            phase = %request.phase(),
        );

        async {
            let deadline = self.settings.operation_timeout;
            let pending = PendingRemovals::new();
            let run = self.dispatch(request, &pending);
            let outcome = match tokio::time::timeout(deadline, run).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(error)) => ExecutionOutcome::from_error(&error),
                Err(_) => {
                    self.reclaim(&pending).await;
                    ExecutionOutcome::failure(
                        ErrorCode::TIMEOUT,
                        format!("experiment did not finish within {deadline:?}"),
                    )
                }
            };

            if outcome.is_fatal() {
                warn!(code = %outcome.code, message = %outcome.message, "experiment failed");
            } else {
                info!(code = %outcome.code, success = outcome.success, "experiment finished");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn reclaim(&self, pending: &PendingRemovals) {
        let orphans = pending.take();
        if orphans.is_empty() {
            return;
        }
        match self.connections.connection(None).await {
            Ok(client) => {
                for container_id in &orphans {
                    EngineConnector::discard(client, container_id).await;
                }
            }
            Err(error) => warn!(%error, ?orphans, "cannot remove containers left by a cancelled run"),
        }
    }

    async fn dispatch(
        &self,
        request: &ExperimentRequest,
        pending: &PendingRemovals,
    ) -> Result<ExecutionOutcome, ChaosError> {
        let category: FaultCategory = request.target().parse()?;
        request.container_identity().ensure_present()?;

        let client = self
            .connections
            .connection(request.flag(flags::DOCKER_ENDPOINT))
            .await?;

        debug!(category = category.as_str(), "dispatching experiment");
        match category {
            FaultCategory::Cpu
            | FaultCategory::Mem
            | FaultCategory::Disk
            | FaultCategory::Process
            | FaultCategory::File => {
                InContainerStrategy::new(&self.settings, self.inspector.as_ref())
                    .run(client, request)
                    .await
            }
            FaultCategory::Network => {
                SidecarStrategy::new(
                    &self.settings,
                    self.settings.network_policy,
                    &self.sidecar_locks,
                    pending,
                )
                .run(client, request)
                .await
            }
            FaultCategory::Container => container_remove::run(client, request).await,
        }
    }
}
