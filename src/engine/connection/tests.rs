//! Unit tests for socket resolution, API versions, and client construction.

use mockable::MockEnv;
use rstest::{fixture, rstest};

use super::{ApiVersion, EngineConnector, SocketResolver};

// =============================================================================
// Fixtures
// =============================================================================

/// Fixture providing a `MockEnv` that returns `None` for all environment
/// variable queries.
#[fixture]
fn empty_env() -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_string().returning(|_| None);
    env
}

/// Fixture providing a `MockEnv` with `DOCKER_HOST` set to a custom socket path.
#[fixture]
fn docker_host_env() -> MockEnv {
    env_with_docker_host("unix:///custom/docker.sock")
}

/// Fixture providing a `MockEnv` with `DOCKER_HOST` set to an empty string
/// and `PODMAN_HOST` set to a valid socket path.
#[fixture]
fn docker_empty_podman_fallback_env() -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_string().returning(|key| match key {
        "DOCKER_HOST" => Some(String::new()),
        "PODMAN_HOST" => Some(String::from("unix:///podman.sock")),
        _ => None,
    });
    env
}

fn env_with_docker_host(value: &'static str) -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_string().returning(move |key| {
        if key == "DOCKER_HOST" {
            Some(String::from(value))
        } else {
            None
        }
    });
    env
}

// =============================================================================
// SocketResolver tests
// =============================================================================

#[rstest]
fn resolver_returns_none_when_no_env_vars_set(empty_env: MockEnv) {
    let resolver = SocketResolver::new(&empty_env);
    assert!(resolver.resolve_from_env().is_none());
}

#[rstest]
#[case::docker_host_only(
    vec![("DOCKER_HOST", "unix:///docker.sock")],
    Some("unix:///docker.sock")
)]
#[case::container_host_only(
    vec![("CONTAINER_HOST", "unix:///container.sock")],
    Some("unix:///container.sock")
)]
#[case::podman_host_only(
    vec![("PODMAN_HOST", "unix:///podman.sock")],
    Some("unix:///podman.sock")
)]
#[case::docker_over_podman(
    vec![("DOCKER_HOST", "tcp://remotehost:2375"), ("PODMAN_HOST", "unix:///podman.sock")],
    Some("tcp://remotehost:2375")
)]
#[case::container_over_podman(
    vec![("CONTAINER_HOST", "unix:///container.sock"), ("PODMAN_HOST", "unix:///podman.sock")],
    Some("unix:///container.sock")
)]
fn resolver_env_var_resolution(
    #[case] env_vars: Vec<(&'static str, &'static str)>,
    #[case] expected: Option<&str>,
) {
    let mut env = MockEnv::new();
    env.expect_string().returning(move |key| {
        env_vars
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| String::from(*value))
    });
    let resolver = SocketResolver::new(&env);
    assert_eq!(resolver.resolve_from_env(), expected.map(String::from));
}

#[rstest]
fn resolver_skips_empty_values(docker_empty_podman_fallback_env: MockEnv) {
    let resolver = SocketResolver::new(&docker_empty_podman_fallback_env);
    assert_eq!(
        resolver.resolve_from_env(),
        Some(String::from("unix:///podman.sock"))
    );
}

#[rstest]
#[cfg(unix)]
fn default_socket_is_unix_socket() {
    assert_eq!(
        SocketResolver::<MockEnv>::default_socket(),
        "unix:///var/run/docker.sock"
    );
}

// =============================================================================
// EngineConnector::resolve_socket tests
// =============================================================================

#[rstest]
fn resolve_socket_uses_config_when_provided(docker_host_env: MockEnv) {
    let resolver = SocketResolver::new(&docker_host_env);
    let socket = EngineConnector::resolve_socket(Some("unix:///config.sock"), &resolver);
    assert_eq!(socket, "unix:///config.sock");
}

#[rstest]
fn resolve_socket_empty_config_falls_back_to_env(docker_host_env: MockEnv) {
    let resolver = SocketResolver::new(&docker_host_env);
    let socket = EngineConnector::resolve_socket(Some(""), &resolver);
    assert_eq!(socket, "unix:///custom/docker.sock");
}

#[rstest]
#[cfg(unix)]
fn resolve_socket_uses_default_when_no_source_available(empty_env: MockEnv) {
    let resolver = SocketResolver::new(&empty_env);
    let socket = EngineConnector::resolve_socket(None, &resolver);
    assert_eq!(socket, "unix:///var/run/docker.sock");
}

// =============================================================================
// EngineConnector::connect tests
// =============================================================================

#[rstest]
#[case::tcp_with_hostname("tcp://host:2375")]
#[case::tcp_with_ip("tcp://192.168.1.100:2376")]
#[case::http_endpoint("http://remotehost:2375")]
#[case::https_endpoint("https://remotehost:2376")]
fn connect_http_compatible_endpoints_creates_client(#[case] endpoint: &str) {
    // connect_with_http only builds client configuration; no daemon is needed.
    let result = EngineConnector::connect(endpoint, ApiVersion::new(1, 41));
    assert!(result.is_ok(), "connect {endpoint} failed: {:?}", result.err());
}

#[rstest]
fn connect_pins_requested_api_version() {
    let docker = EngineConnector::connect("tcp://localhost:2375", ApiVersion::new(1, 38))
        .expect("tcp endpoint should create client");
    assert_eq!(
        ApiVersion::from(&docker.client_version()),
        ApiVersion::new(1, 38)
    );
}

// =============================================================================
// ApiVersion tests
// =============================================================================

#[rstest]
#[case("1.41", Some(ApiVersion::new(1, 41)))]
#[case(" v1.24 ", Some(ApiVersion::new(1, 24)))]
#[case("1", None)]
#[case("one.two", None)]
#[case("", None)]
fn api_version_parses_major_minor(#[case] input: &str, #[case] expected: Option<ApiVersion>) {
    assert_eq!(ApiVersion::parse(input), expected);
}

#[rstest]
fn api_versions_compare_numerically() {
    assert!(ApiVersion::new(1, 9) < ApiVersion::new(1, 41));
    assert!(ApiVersion::new(2, 0) > ApiVersion::new(1, 49));
    assert_eq!(ApiVersion::new(1, 41).to_string(), "1.41");
}
