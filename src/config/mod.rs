//! Configuration system for bladedock.
//!
//! Configuration loading and precedence merging is handled by the
//! `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/bladedock/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! docker_endpoint = "unix:///var/run/docker.sock"
//! api_version = "1.41"
//! operation_timeout_secs = 300
//!
//! [tool]
//! name = "chaosblade"
//! bin = "blade"
//! staging_dir = "/opt"
//! version = "1.7.2"
//! archive_path = "/opt/chaosblade-1.7.2.tar.gz"
//!
//! [sidecar]
//! image_repo = "registry.cn-hangzhou.aliyuncs.com/chaosblade/chaosblade-tool"
//! image_version = "latest"
//! network_policy = "resident"
//! ready_timeout_ms = 5000
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, ExperimentArgs};
pub use loader::{env_var_names, load_config};
pub use types::{
    AppConfig, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_TOOL_VERSION, SidecarConfig, SidecarPolicy,
    ToolConfig,
};
