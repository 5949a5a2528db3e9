//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::{AppConfig, SidecarPolicy};

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        docker_endpoint = "tcp://10.0.0.5:2375"
        api_version = "1.41"
        operation_timeout_secs = 60

        [tool]
        name = "chaosblade"
        bin = "blade"
        staging_dir = "/opt"
        version = "1.7.2"
        archive_path = "/srv/chaos/chaosblade-1.7.2.tar.gz"

        [sidecar]
        image_repo = "registry.local/chaos/chaosblade-tool"
        image_version = "1.7.2"
        network_policy = "ephemeral"
        ready_timeout_ms = 2000
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        docker_endpoint = "unix:///tmp/docker.sock"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(
        config.docker_endpoint.is_none(),
        "docker_endpoint should be None"
    );
    assert!(config.api_version.is_none(), "api_version should be None");
    assert_eq!(config.operation_timeout_secs(), 300);
    assert_eq!(config.tool.name, "chaosblade");
    assert_eq!(config.tool.bin, "blade");
    assert_eq!(config.tool.staging_dir, "/opt");
    assert!(config.tool.archive_path.is_none());
    assert_eq!(config.sidecar.image_version, "latest");
    assert_eq!(config.sidecar.network_policy, SidecarPolicy::Resident);
    assert_eq!(config.sidecar.ready_timeout_ms, 5000);
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "docker_endpoint": "unix:///from/file.sock",
            "api_version": "1.41"
        }),
        None,
    );

    composer.push_environment(json!({
        "docker_endpoint": "unix:///from/env.sock"
    }));

    Ok(composer)
}
