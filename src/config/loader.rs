//! Configuration loading with layered precedence.
//!
//! Precedence, lowest to highest: application defaults, configuration file,
//! environment variables, command-line arguments.
//!
//! Layers are composed with `MergeComposer` directly rather than through the
//! derived `load()`: the `Cli` owns subcommand dispatch, `--config` must be
//! honoured before discovery, and typed environment values must fail fast
//! instead of being silently dropped.
//!
//! # Environment Variable Handling
//!
//! String fields such as `BLADEDOCK_DOCKER_ENDPOINT` are always accepted.
//! Integer fields (`BLADEDOCK_OPERATION_TIMEOUT_SECS`) and the sidecar policy
//! (`BLADEDOCK_SIDECAR_NETWORK_POLICY=resident|ephemeral`) must parse or
//! loading fails with `ConfigError::InvalidValue`.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::ValueEnum;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli, SidecarPolicy};
use crate::error::{ChaosError, ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Debug, Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
    /// A [`SidecarPolicy`] name. Invalid values return an error.
    Policy,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `BLADEDOCK_DOCKER_ENDPOINT`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["sidecar", "image_repo"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    // Top-level fields
    EnvVarSpec {
        env_var: "BLADEDOCK_DOCKER_ENDPOINT",
        path: &["docker_endpoint"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_API_VERSION",
        path: &["api_version"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_OPERATION_TIMEOUT_SECS",
        path: &["operation_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    // Tool fields
    EnvVarSpec {
        env_var: "BLADEDOCK_TOOL_NAME",
        path: &["tool", "name"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_TOOL_BIN",
        path: &["tool", "bin"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_TOOL_STAGING_DIR",
        path: &["tool", "staging_dir"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_TOOL_VERSION",
        path: &["tool", "version"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_TOOL_ARCHIVE_PATH",
        path: &["tool", "archive_path"],
        var_type: EnvVarType::String,
    },
    // Sidecar fields
    EnvVarSpec {
        env_var: "BLADEDOCK_SIDECAR_IMAGE_REPO",
        path: &["sidecar", "image_repo"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_SIDECAR_IMAGE_VERSION",
        path: &["sidecar", "image_version"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_SIDECAR_NETWORK_POLICY",
        path: &["sidecar", "network_policy"],
        var_type: EnvVarType::Policy,
    },
    EnvVarSpec {
        env_var: "BLADEDOCK_SIDECAR_READY_TIMEOUT_MS",
        path: &["sidecar", "ready_timeout_ms"],
        var_type: EnvVarType::U64,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `BLADEDOCK_*` variable without keeping a
/// second list in sync.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// The file is read through a `cap_std::fs_utf8` handle on its parent
/// directory.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// 1. Application defaults
/// 2. Configuration file (`--config`, `BLADEDOCK_CONFIG_PATH`, or discovery)
/// 3. Environment variables prefixed with `BLADEDOCK_`
/// 4. Command-line arguments
///
/// The merged tool settings are validated before returning.
///
/// # Errors
///
/// Returns `ConfigError` when a configuration file is malformed, a typed
/// environment variable does not parse, the merge fails, or a tool layout
/// field is blank.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    let config_path: Option<Utf8PathBuf> =
        cli.config.clone().filter(|p| p.exists()).or_else(|| {
            let discovery = ConfigDiscovery::builder("bladedock")
                .env_var("BLADEDOCK_CONFIG_PATH")
                .config_file_name("config.toml")
                .dotfile_name(".bladedock.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        });

    if let Some(ref path) = config_path {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.tool.validate()?;

    Ok(config)
}

/// Collect `BLADEDOCK_*` environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` when a typed variable has an
/// unparseable value.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };
        let json_value = parse_env_value(spec, raw_value)?;
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(spec: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let invalid = |reason: String| -> ChaosError {
        ConfigError::InvalidValue {
            field: spec.env_var.to_owned(),
            reason,
        }
        .into()
    };

    match spec.var_type {
        EnvVarType::String => Ok(Value::String(raw_value)),
        EnvVarType::U64 => raw_value
            .trim()
            .parse::<u64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| invalid(format!("expected unsigned integer, got '{raw_value}'"))),
        EnvVarType::Policy => SidecarPolicy::from_str(raw_value.trim(), true)
            .map(|policy| {
                Value::String(
                    policy
                        .to_possible_value()
                        .map(|value| value.get_name().to_owned())
                        .unwrap_or_default(),
                )
            })
            .map_err(|_| invalid(format!("expected resident or ephemeral, got '{raw_value}'"))),
    }
}

/// Insert a value at a nested path in a JSON map, creating intermediate
/// objects as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();

    if let Some(ref endpoint) = cli.docker_endpoint {
        overrides.insert(
            "docker_endpoint".to_owned(),
            serde_json::Value::String(endpoint.clone()),
        );
    }

    if overrides.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(overrides)
    }
}
