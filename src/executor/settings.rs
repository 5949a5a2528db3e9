//! Engine settings derived from the loaded configuration.

use std::time::Duration;

use camino::Utf8PathBuf;

use crate::config::{AppConfig, SidecarPolicy};
use crate::engine::{ApiVersion, ToolLayout};
use crate::error::{ChaosError, ConfigError};

/// Validated, ready-to-use settings for [`ChaosEngine`](super::ChaosEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Where the chaos tool lives inside containers.
    pub layout: ToolLayout,
    /// Host path of the tool archive deployed on create.
    pub archive_path: Utf8PathBuf,
    /// API version the daemon client starts negotiation from.
    pub api_version: ApiVersion,
    /// Default sidecar image repository.
    pub sidecar_image_repo: String,
    /// Default sidecar image tag.
    pub sidecar_image_version: String,
    /// Sidecar policy for network experiments.
    pub network_policy: SidecarPolicy,
    /// How long a new sidecar may take to report running.
    pub sidecar_ready_timeout: Duration,
    /// Deadline for one experiment step.
    pub operation_timeout: Duration,
}

impl EngineSettings {
    /// Build settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` for a blank tool layout field
    /// and `ConfigError::InvalidValue` for an unparseable API version or a
    /// zero operation timeout.
    pub fn from_config(config: &AppConfig) -> Result<Self, ChaosError> {
        config.tool.validate()?;

        let api_version = match config.api_version.as_deref() {
            Some(raw) => ApiVersion::parse(raw).ok_or_else(|| ConfigError::InvalidValue {
                field: String::from("api_version"),
                reason: format!("expected MAJOR.MINOR, got '{raw}'"),
            })?,
            None => ApiVersion::client_default(),
        };

        let timeout_secs = config.operation_timeout_secs();
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("operation_timeout_secs"),
                reason: String::from("must be greater than zero"),
            }
            .into());
        }

        Ok(Self {
            layout: ToolLayout::new(
                config.tool.staging_dir.as_str(),
                config.tool.name.as_str(),
                config.tool.bin.as_str(),
            ),
            archive_path: config.tool.resolved_archive_path(),
            api_version,
            sidecar_image_repo: config.sidecar.image_repo.clone(),
            sidecar_image_version: config.sidecar.image_version.clone(),
            network_policy: config.sidecar.network_policy,
            sidecar_ready_timeout: Duration::from_millis(config.sidecar.ready_timeout_ms),
            operation_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
