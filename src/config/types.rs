//! Configuration data types for bladedock.

use camino::Utf8PathBuf;
use clap::ValueEnum;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

/// Default operation deadline in seconds.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300;

/// Chaos tool release the default archive path points at.
pub const DEFAULT_TOOL_VERSION: &str = "1.7.2";

/// How network experiments manage their sidecar container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarPolicy {
    /// One long-lived sidecar per target and action, reused until destroyed.
    #[default]
    Resident,
    /// A fresh sidecar for every invocation, removed afterwards.
    Ephemeral,
}

/// Chaos tool installation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Install directory name under `staging_dir`.
    pub name: String,

    /// Entry point within the install directory.
    pub bin: String,

    /// Directory inside the container that archives are unpacked into.
    pub staging_dir: String,

    /// Tool version, used to derive the default archive path.
    pub version: String,

    /// Host path of the tool archive. Derived from `version` when unset.
    pub archive_path: Option<Utf8PathBuf>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            name: String::from("chaosblade"),
            bin: String::from("blade"),
            staging_dir: String::from("/opt"),
            version: String::from(DEFAULT_TOOL_VERSION),
            archive_path: None,
        }
    }
}

impl ToolConfig {
    /// The configured archive path, or `/opt/<name>-<version>.tar.gz`.
    #[must_use]
    pub fn resolved_archive_path(&self) -> Utf8PathBuf {
        self.archive_path.clone().unwrap_or_else(|| {
            Utf8PathBuf::from(format!("/opt/{}-{}.tar.gz", self.name, self.version))
        })
    }

    /// Checks that the install layout fields are non-empty.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` naming every blank field.
    pub fn validate(&self) -> crate::error::Result<()> {
        let missing: Vec<&str> = [
            ("tool.name", &self.name),
            ("tool.bin", &self.bin),
            ("tool.staging_dir", &self.staging_dir),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if !missing.is_empty() {
            return Err(crate::error::ConfigError::MissingRequired {
                field: missing.join(", "),
            }
            .into());
        }
        Ok(())
    }
}

/// Network sidecar settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// Image repository for sidecar containers.
    pub image_repo: String,

    /// Image tag for sidecar containers.
    pub image_version: String,

    /// Sidecar policy for network experiments.
    pub network_policy: SidecarPolicy,

    /// How long to wait for a new sidecar to report running.
    pub ready_timeout_ms: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            image_repo: String::from(
                "registry.cn-hangzhou.aliyuncs.com/chaosblade/chaosblade-tool",
            ),
            image_version: String::from("latest"),
            network_policy: SidecarPolicy::Resident,
            ready_timeout_ms: 5000,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `BLADEDOCK_CONFIG_PATH` environment variable
/// 2. `.bladedock.toml` in the current working directory
/// 3. `.bladedock.toml` in the home directory
/// 4. `~/.config/bladedock/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "BLADEDOCK",
    post_merge_hook,
    discovery(
        app_name = "bladedock",
        env_var = "BLADEDOCK_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".bladedock.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Docker endpoint: socket path or URL.
    pub docker_endpoint: Option<String>,

    /// Engine API version the client starts negotiation from, e.g. `1.41`.
    pub api_version: Option<String>,

    /// Overall deadline for one experiment step, in seconds.
    pub operation_timeout_secs: Option<u64>,

    /// Chaos tool installation settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub tool: ToolConfig,

    /// Network sidecar settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub sidecar: SidecarConfig,
}

impl AppConfig {
    /// The operation deadline, falling back to the default.
    #[must_use]
    pub fn operation_timeout_secs(&self) -> u64 {
        self.operation_timeout_secs
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT_SECS)
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        self.docker_endpoint = self
            .docker_endpoint
            .take()
            .filter(|endpoint| !endpoint.trim().is_empty());
        self.api_version = self
            .api_version
            .take()
            .filter(|version| !version.trim().is_empty());
        Ok(())
    }
}
