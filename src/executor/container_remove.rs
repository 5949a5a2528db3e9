//! Actions on the target container itself.

use tracing::info;

use super::{ExecutionOutcome, ExperimentRequest, Phase, flags};
use crate::engine::{EngineClient, EngineConnector};
use crate::error::{ChaosError, ConfigError};

/// Grace period given to a container before it is killed.
const STOP_TIMEOUT_SECS: i32 = 1;

const REMOVE_ACTIONS: &[&str] = &["remove", "rm"];

/// Remove the target container on create; destroy has nothing to undo.
pub(super) async fn run<C: EngineClient + ?Sized>(
    client: &C,
    request: &ExperimentRequest,
) -> Result<ExecutionOutcome, ChaosError> {
    let action = request.action().trim();
    if !REMOVE_ACTIONS.contains(&action) {
        return Err(ConfigError::InvalidValue {
            field: String::from("action"),
            reason: format!("unsupported container action '{action}'"),
        }
        .into());
    }

    if request.phase() == Phase::Destroy {
        return Ok(ExecutionOutcome::success(None));
    }

    let target = EngineConnector::resolve_container(client, &request.container_identity()).await?;
    if request.flag_enabled(flags::FORCE) {
        EngineConnector::force_remove(client, &target.id).await?;
    } else {
        EngineConnector::stop_and_remove(client, &target.id, STOP_TIMEOUT_SECS).await?;
    }
    info!(container_id = %target.id, container = target.primary_name(), "removed target container");
    Ok(ExecutionOutcome::success(None))
}
