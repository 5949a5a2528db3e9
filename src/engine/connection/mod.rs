//! Socket resolution and container engine connection.
//!
//! This module resolves the daemon endpoint from request flags, configuration,
//! environment variables, and platform defaults, then builds `Bollard` clients
//! pinned to a requested API version. The daemon-facing operations used by the
//! experiment strategies live in the submodules, each behind a small trait seam
//! so they can be exercised without a live daemon.

mod deploy;
mod error_classification;
mod exec;
mod lifecycle;
mod locator;
mod negotiation;

use std::fmt;

use bollard::{ClientVersion, Docker};

use crate::error::ChaosError;

pub use deploy::{
    ArchiveInspector, ContainerUploader, DeployOutcome, DeploySource, TarArchiveInspector,
    ToolLayout, UploadToContainerFuture,
};
pub use exec::{
    ContainerExecClient, CreateExecFuture, ExecOutput, ExecPrivilege, StartExecFuture, shell_quote,
};
pub use lifecycle::{
    ContainerLifecycle, ContainerRunState, CreateContainerFuture, CreateContainerRequest,
    EngineFuture, EphemeralRun, ImageClient, PendingRemovals, SidecarHostConfig,
};
pub use locator::{
    ContainerFilter, ContainerIdentity, ContainerLister, ContainerRecord, ContainerState,
    ListContainersFuture,
};
pub use negotiation::{ConnectionManager, Connector, EnginePinger, PingFailure, PingFuture};

/// Environment variable names checked in fallback order after configuration sources.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Connection timeout in seconds for Docker/Podman API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Default socket path for Unix platforms.
#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Default socket path for Windows platforms.
#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Everything the experiment strategies need from a daemon client.
///
/// Implemented automatically for any type that provides each individual
/// capability, including `bollard::Docker` and test doubles.
pub trait EngineClient:
    ContainerLister
    + ContainerLifecycle
    + ImageClient
    + ContainerExecClient
    + ContainerUploader
    + EnginePinger
    + Send
    + Sync
{
}

impl<T> EngineClient for T where
    T: ContainerLister
        + ContainerLifecycle
        + ImageClient
        + ContainerExecClient
        + ContainerUploader
        + EnginePinger
        + Send
        + Sync
{
}

/// A daemon API version in `major.minor` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    major: usize,
    minor: usize,
}

impl ApiVersion {
    /// Create a version from its components.
    #[must_use]
    pub const fn new(major: usize, minor: usize) -> Self {
        Self { major, minor }
    }

    /// The newest API version the bundled client library speaks.
    #[must_use]
    pub const fn client_default() -> Self {
        Self::new(
            bollard::API_DEFAULT_VERSION.major_version,
            bollard::API_DEFAULT_VERSION.minor_version,
        )
    }

    /// Parse a `major.minor` string, tolerating a leading `v`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (major, minor) = digits.split_once('.')?;
        Some(Self::new(major.parse().ok()?, minor.parse().ok()?))
    }

    const fn to_client_version(self) -> ClientVersion {
        ClientVersion {
            major_version: self.major,
            minor_version: self.minor,
        }
    }
}

impl From<&ClientVersion> for ApiVersion {
    fn from(version: &ClientVersion) -> Self {
        Self::new(version.major_version, version.minor_version)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Resolves container engine socket endpoints from environment variables.
///
/// The resolver checks a prioritized list of environment variables to find
/// the socket endpoint when no explicit configuration is provided.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use bladedock::engine::SocketResolver;
///
/// let env = DefaultEnv::new();
/// let resolver = SocketResolver::new(&env);
///
/// if let Some(socket) = resolver.resolve_from_env() {
///     println!("Found socket: {}", socket);
/// }
/// ```
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves the socket endpoint from fallback environment variables.
    ///
    /// Checks `DOCKER_HOST`, `CONTAINER_HOST`, then `PODMAN_HOST`, and returns
    /// `None` if none is set to a non-empty value.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Returns the platform default socket path.
    #[must_use]
    pub const fn default_socket() -> &'static str {
        DEFAULT_SOCKET
    }
}

/// Classifies socket endpoint types for connection handling.
enum SocketType {
    /// Unix socket or Windows named pipe with explicit scheme.
    Socket,
    /// HTTP, HTTPS, or TCP endpoint (TCP is rewritten to HTTP).
    Http,
    /// Bare path without scheme prefix.
    BarePath,
}

impl SocketType {
    fn is_socket_scheme(socket: &str) -> bool {
        socket.starts_with("unix://") || socket.starts_with("npipe://")
    }

    fn is_http_scheme(socket: &str) -> bool {
        socket.starts_with("tcp://")
            || socket.starts_with("http://")
            || socket.starts_with("https://")
    }

    fn classify(socket: &str) -> Self {
        match (Self::is_socket_scheme(socket), Self::is_http_scheme(socket)) {
            (true, _) => Self::Socket,
            (_, true) => Self::Http,
            _ => Self::BarePath,
        }
    }
}

/// Provides methods to connect to Docker-compatible container engines and to
/// drive the container operations that chaos experiments need.
pub struct EngineConnector;

impl EngineConnector {
    /// Build a client for `socket` that speaks the given API version.
    ///
    /// Supports `unix://`, `npipe://`, `tcp://` (treated as HTTP), `http://`,
    /// and `https://` endpoints, plus bare paths. Bare paths starting with `\\`
    /// or `//` are treated as named pipes and everything else as a Unix socket.
    /// No request is sent; use [`ConnectionManager`] to verify the daemon.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::SocketNotFound`, `ContainerError::PermissionDenied`,
    /// or `ContainerError::ConnectionFailed` when the client cannot be built.
    pub fn connect(socket: &str, version: ApiVersion) -> Result<Docker, ChaosError> {
        let client_version = version.to_client_version();
        let socket_uri = match SocketType::classify(socket) {
            SocketType::Socket => socket.to_owned(),
            SocketType::Http => {
                // Rewrite tcp:// to http:// for Bollard compatibility
                let http_socket = if socket.starts_with("tcp://") {
                    socket.replacen("tcp://", "http://", 1)
                } else {
                    socket.to_owned()
                };
                return Docker::connect_with_http(
                    &http_socket,
                    CONNECTION_TIMEOUT_SECS,
                    &client_version,
                )
                .map_err(|error| {
                    ChaosError::from(error_classification::classify_connection_error(
                        &error,
                        &http_socket,
                    ))
                });
            }
            SocketType::BarePath => Self::normalize_bare_path(socket),
        };

        Docker::connect_with_socket(&socket_uri, CONNECTION_TIMEOUT_SECS, &client_version).map_err(
            |error| {
                ChaosError::from(error_classification::classify_connection_error(
                    &error,
                    &socket_uri,
                ))
            },
        )
    }

    /// Normalize a bare socket path to a URI with the appropriate scheme.
    fn normalize_bare_path(path: &str) -> String {
        if path.starts_with("\\\\") || path.starts_with("//") {
            format!("npipe://{path}")
        } else {
            format!("unix://{path}")
        }
    }

    /// Resolves the default socket endpoint without establishing a connection.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from the config file or `BLADEDOCK_DOCKER_ENDPOINT`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    ///
    /// A per-request `docker-endpoint` flag takes precedence over all of these
    /// and is applied by [`ConnectionManager::connection`].
    #[must_use]
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> String {
        config_socket
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| resolver.resolve_from_env())
            .unwrap_or_else(|| SocketResolver::<E>::default_socket().to_owned())
    }
}

#[cfg(test)]
mod tests;
