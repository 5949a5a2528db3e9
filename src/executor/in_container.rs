//! Runs the chaos tool inside the target container.

use tracing::debug;

use super::command::{DestroyForm, create_command, destroy_command};
use super::{EngineSettings, ExecutionOutcome, ExperimentRequest, Phase, ResponseDecoder, flags};
use crate::engine::{
    ArchiveInspector, DeploySource, EngineClient, EngineConnector, ExecPrivilege,
};
use crate::error::ChaosError;

/// Deploys the tool into the target on create, then execs it as root.
pub(super) struct InContainerStrategy<'a> {
    settings: &'a EngineSettings,
    inspector: &'a dyn ArchiveInspector,
}

impl<'a> InContainerStrategy<'a> {
    pub(super) const fn new(settings: &'a EngineSettings, inspector: &'a dyn ArchiveInspector) -> Self {
        Self {
            settings,
            inspector,
        }
    }

    pub(super) async fn run<C: EngineClient + ?Sized>(
        &self,
        client: &C,
        request: &ExperimentRequest,
    ) -> Result<ExecutionOutcome, ChaosError> {
        // The archive is checked before the daemon is asked about the target.
        let source = match request.phase() {
            Phase::Create => Some(self.deploy_source(request)?),
            Phase::Destroy => None,
        };

        let target =
            match EngineConnector::resolve_container(client, &request.container_identity()).await
            {
                Ok(target) => target,
                Err(error) if error.is_not_found() && request.phase() == Phase::Destroy => {
                    return Ok(ExecutionOutcome::already_destroyed(&error));
                }
                Err(error) => return Err(error),
            };

        let layout = &self.settings.layout;
        let command = if let Some(deploy) = source {
            EngineConnector::deploy_tool(
                client,
                &target.id,
                layout,
                &deploy,
                request.flag_enabled(flags::BLADE_OVERRIDE),
            )
            .await?;
            create_command(&layout.bin_path(), request)
        } else {
            destroy_command(&layout.bin_path(), request, DestroyForm::PreferUid)
        };

        debug!(container_id = %target.id, container = target.primary_name(), "executing chaos tool");
        let output =
            EngineConnector::exec_shell(client, &target.id, &command, ExecPrivilege::Root).await;
        Ok(ResponseDecoder::decode(output, None))
    }

    fn deploy_source(&self, request: &ExperimentRequest) -> Result<DeploySource, ChaosError> {
        let archive_path = request
            .flag(flags::BLADE_TAR_FILE)
            .map_or_else(|| self.settings.archive_path.clone(), camino::Utf8PathBuf::from);
        DeploySource::inspect(archive_path, self.inspector)
    }
}
