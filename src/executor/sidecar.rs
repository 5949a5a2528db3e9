//! Runs the chaos tool from a helper container in the target's network
//! namespace.
//!
//! Resident sidecars follow this state machine, one sidecar per name:
//!
//! ```text
//! create:  absent             -> create+start -> running -> exec
//!          found, running     ->                            exec
//!          found, not running -> force-remove -> create+start -> exec
//!          found, other target -> force-remove -> create+start -> exec
//! destroy: absent             -> already destroyed (non-fatal)
//!          found              -> exec -> success: force-remove
//!                                     -> failure: keep for inspection
//! ```
//!
//! A sidecar records the id of the target it joined in [`TARGET_LABEL`], so
//! a target recreated under the same name gets a fresh sidecar. When the
//! target is gone at destroy time the sidecar name is derived from the
//! `container-name` flag and the sidecar is still reclaimed.
//!
//! Ephemeral sidecars are created for a single exec and always removed, even
//! when the run is cancelled by the operation deadline.

use tracing::{debug, info, warn};

use super::command::{DestroyForm, create_command, destroy_command};
use super::locks::SidecarLocks;
use super::{EngineSettings, ExecutionOutcome, ExperimentRequest, Phase, ResponseDecoder, flags};
use crate::config::SidecarPolicy;
use crate::engine::{
    ContainerRecord, CreateContainerRequest, EngineClient, EngineConnector, EphemeralRun,
    ExecPrivilege, PendingRemovals, SidecarHostConfig,
};
use crate::error::{ChaosError, ContainerError};

/// Label applied to every sidecar container.
pub const SIDECAR_LABEL: (&str, &str) = ("chaosblade", "chaosblade-sidecar");

/// Label holding the id of the container whose network a sidecar joined.
pub const TARGET_LABEL: &str = "chaosblade.target";

const SIDECAR_CAPABILITY: &str = "NET_ADMIN";
const SIDECAR_SHELL: &str = "/bin/sh";

/// Deterministic sidecar name for a target and experiment.
///
/// Characters outside `[A-Za-z0-9_.-]` become `-`.
#[must_use]
pub fn sidecar_name(target_name: &str, category: &str, action: &str) -> String {
    format!(
        "{}-{category}-{action}",
        target_name.trim_start_matches('/')
    )
    .chars()
    .map(|c| {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            c
        } else {
            '-'
        }
    })
    .collect()
}

fn is_sidecar(container: &ContainerRecord) -> bool {
    container.label(SIDECAR_LABEL.0) == Some(SIDECAR_LABEL.1)
}

pub(super) struct SidecarStrategy<'a> {
    settings: &'a EngineSettings,
    policy: SidecarPolicy,
    locks: &'a SidecarLocks,
    pending: &'a PendingRemovals,
}

impl<'a> SidecarStrategy<'a> {
    pub(super) const fn new(
        settings: &'a EngineSettings,
        policy: SidecarPolicy,
        locks: &'a SidecarLocks,
        pending: &'a PendingRemovals,
    ) -> Self {
        Self {
            settings,
            policy,
            locks,
            pending,
        }
    }

    pub(super) async fn run<C: EngineClient + ?Sized>(
        &self,
        client: &C,
        request: &ExperimentRequest,
    ) -> Result<ExecutionOutcome, ChaosError> {
        let identity = request.container_identity();
        let resolved = EngineConnector::resolve_container(client, &identity)
            .await
            .and_then(|candidate| {
                // A loose name match can land on a sidecar once its target is gone.
                if is_sidecar(&candidate) {
                    Err(ChaosError::from(ContainerError::NotFound {
                        identifier: String::from(
                            request
                                .flag(flags::CONTAINER_NAME)
                                .unwrap_or(candidate.primary_name()),
                        ),
                    }))
                } else {
                    Ok(candidate)
                }
            });
        let target = match resolved {
            Ok(target) => target,
            Err(error) if error.is_not_found() && request.phase() == Phase::Destroy => {
                return self.destroy_without_target(client, request, &error).await;
            }
            Err(error) => return Err(error),
        };

        let name = sidecar_name(target.primary_name(), request.target(), request.action());
        let _guard = self.locks.acquire(&name).await;
        debug!(sidecar = %name, policy = ?self.policy, "holding sidecar lock");

        match (self.policy, request.phase()) {
            (SidecarPolicy::Resident, Phase::Create) => {
                self.resident_create(client, &target, &name, request).await
            }
            (SidecarPolicy::Resident, Phase::Destroy) => {
                self.resident_destroy(client, &name, request).await
            }
            (SidecarPolicy::Ephemeral, _) => {
                self.ephemeral(client, &target, &name, request).await
            }
        }
    }

    async fn resident_create<C: EngineClient + ?Sized>(
        &self,
        client: &C,
        target: &ContainerRecord,
        name: &str,
        request: &ExperimentRequest,
    ) -> Result<ExecutionOutcome, ChaosError> {
        let sidecar_id = match EngineConnector::find_container_by_name(client, name).await? {
            Some(existing)
                if existing.state.is_running()
                    && existing.label(TARGET_LABEL) == Some(target.id.as_str()) =>
            {
                debug!(sidecar = name, container_id = %existing.id, "reusing running sidecar");
                existing.id
            }
            Some(stale) => {
                info!(
                    sidecar = name,
                    state = %stale.state,
                    joined = stale.label(TARGET_LABEL).unwrap_or("-"),
                    target = %target.id,
                    "replacing stale sidecar"
                );
                EngineConnector::force_remove(client, &stale.id).await?;
                self.start_sidecar(client, target, name, request).await?
            }
            None => self.start_sidecar(client, target, name, request).await?,
        };

        let command = create_command(&self.settings.layout.bin_path(), request);
        let output =
            EngineConnector::exec_shell(client, &sidecar_id, &command, ExecPrivilege::Default)
                .await;
        Ok(ResponseDecoder::decode(output, None))
    }

    async fn resident_destroy<C: EngineClient + ?Sized>(
        &self,
        client: &C,
        name: &str,
        request: &ExperimentRequest,
    ) -> Result<ExecutionOutcome, ChaosError> {
        let Some(sidecar) = EngineConnector::find_container_by_name(client, name).await? else {
            let error = ChaosError::from(ContainerError::NotFound {
                identifier: String::from(name),
            });
            return Ok(ExecutionOutcome::already_destroyed(&error));
        };

        let command = destroy_command(
            &self.settings.layout.bin_path(),
            request,
            DestroyForm::PreferUid,
        );
        let output =
            EngineConnector::exec_shell(client, &sidecar.id, &command, ExecPrivilege::Default)
                .await;
        let outcome = ResponseDecoder::decode(output, None);

        if outcome.success {
            if let Err(error) = EngineConnector::force_remove(client, &sidecar.id).await {
                warn!(sidecar = name, %error, "fault reversed but sidecar removal failed");
            }
        } else {
            warn!(sidecar = name, code = %outcome.code, "destroy failed; keeping sidecar for inspection");
        }
        Ok(outcome)
    }

    /// Destroy when the target container no longer exists.
    ///
    /// A resident sidecar for the named target may still be around. A running
    /// one goes through the normal destroy sequence; one that stopped with
    /// its target is removed outright, since the fault went with the
    /// namespace.
    async fn destroy_without_target<C: EngineClient + ?Sized>(
        &self,
        client: &C,
        request: &ExperimentRequest,
        error: &ChaosError,
    ) -> Result<ExecutionOutcome, ChaosError> {
        let target_name = request
            .flag(flags::CONTAINER_NAME)
            .filter(|_| self.policy == SidecarPolicy::Resident);
        let Some(target_name) = target_name else {
            return Ok(ExecutionOutcome::already_destroyed(error));
        };

        let name = sidecar_name(target_name, request.target(), request.action());
        let _guard = self.locks.acquire(&name).await;
        debug!(sidecar = %name, "target is gone; looking for its sidecar");

        match EngineConnector::find_container_by_name(client, &name).await? {
            Some(sidecar) if !sidecar.state.is_running() => {
                info!(sidecar = %name, state = %sidecar.state, "removing sidecar left by a vanished target");
                EngineConnector::force_remove(client, &sidecar.id).await?;
                Ok(ExecutionOutcome::already_destroyed(error))
            }
            Some(_) => self.resident_destroy(client, &name, request).await,
            None => Ok(ExecutionOutcome::already_destroyed(error)),
        }
    }

    async fn ephemeral<C: EngineClient + ?Sized>(
        &self,
        client: &C,
        target: &ContainerRecord,
        name: &str,
        request: &ExperimentRequest,
    ) -> Result<ExecutionOutcome, ChaosError> {
        if let Some(leftover) = EngineConnector::find_container_by_name(client, name).await? {
            info!(sidecar = name, container_id = %leftover.id, "removing leftover ephemeral sidecar");
            EngineConnector::force_remove(client, &leftover.id).await?;
        }

        let container = self.container_request(target, name, request)?;
        EngineConnector::ensure_image(client, container.image()).await?;

        let bin = self.settings.layout.bin_path();
        let command = match request.phase() {
            Phase::Create => create_command(&bin, request),
            Phase::Destroy => destroy_command(&bin, request, DestroyForm::Matchers),
        };
        let run = EphemeralRun {
            container,
            command,
            remove_after: true,
            ready_timeout: self.settings.sidecar_ready_timeout,
        };
        let output = EngineConnector::execute_and_cleanup(client, &run, self.pending).await;
        Ok(ResponseDecoder::decode(output, None))
    }

    /// Pull, create, start, and await a resident sidecar.
    ///
    /// A sidecar that never reaches running is removed again.
    async fn start_sidecar<C: EngineClient + ?Sized>(
        &self,
        client: &C,
        target: &ContainerRecord,
        name: &str,
        request: &ExperimentRequest,
    ) -> Result<String, ChaosError> {
        let container = self.container_request(target, name, request)?;
        EngineConnector::ensure_image(client, container.image()).await?;
        let sidecar_id = EngineConnector::create_and_start(client, &container).await?;

        if let Err(error) = EngineConnector::wait_until_running(
            client,
            &sidecar_id,
            self.settings.sidecar_ready_timeout,
        )
        .await
        {
            EngineConnector::discard(client, &sidecar_id).await;
            return Err(error);
        }
        info!(sidecar = name, container_id = %sidecar_id, target = %target.id, "sidecar running");
        Ok(sidecar_id)
    }

    fn container_request(
        &self,
        target: &ContainerRecord,
        name: &str,
        request: &ExperimentRequest,
    ) -> Result<CreateContainerRequest, ChaosError> {
        let repo = request
            .flag(flags::IMAGE_REPO)
            .unwrap_or(self.settings.sidecar_image_repo.as_str());
        let version = request
            .flag(flags::IMAGE_VERSION)
            .unwrap_or(self.settings.sidecar_image_version.as_str());

        Ok(CreateContainerRequest::new(format!("{repo}:{version}"))?
            .with_name(Some(String::from(name)))
            .with_cmd(Some(vec![String::from(SIDECAR_SHELL)]))
            .with_tty(true)
            .with_label(SIDECAR_LABEL.0, SIDECAR_LABEL.1)
            .with_label(TARGET_LABEL, target.id.as_str())
            .with_host(SidecarHostConfig {
                network_mode: Some(format!("container:{}", target.id)),
                pid_mode: None,
                cap_add: vec![String::from(SIDECAR_CAPABILITY)],
            }))
    }
}
