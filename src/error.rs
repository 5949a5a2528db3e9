//! Semantic error types for bladedock.
//!
//! Lower layers return these typed errors so callers can inspect, retry, or
//! map them to an outcome code. Strategies translate every error into an
//! [`ExecutionOutcome`](crate::executor::ExecutionOutcome); opaque reports
//! (`eyre::Report`) are reserved for the binary boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::executor::ErrorCode;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value or experiment flag is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur while talking to the container engine.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The engine did not answer a ping within the negotiation window.
    #[error("container engine ping timed out after {seconds} seconds")]
    PingTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// Neither a container id nor a container name was supplied.
    #[error("less parameter: need one of {fields}")]
    AmbiguousInput {
        /// The identifying flags that were expected.
        fields: String,
    },

    /// No container matched the searched identifier.
    #[error("container not found: {identifier}")]
    NotFound {
        /// The id or name that was searched.
        identifier: String,
    },

    /// Listing containers failed.
    #[error("failed to list containers: {message}")]
    ListFailed {
        /// A description of the listing failure.
        message: String,
    },

    /// Failed to create a container.
    #[error("failed to create container '{name}': {message}")]
    CreateFailed {
        /// The requested container name.
        name: String,
        /// A description of the creation failure.
        message: String,
    },

    /// Another container already holds the requested name.
    #[error("container name '{name}' is already in use; retry the operation")]
    NameConflict {
        /// The conflicting container name.
        name: String,
    },

    /// Failed to start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// The container never reached the running state.
    #[error("container '{container_id}' did not reach running state within {millis} ms")]
    NotReady {
        /// The ID of the container.
        container_id: String,
        /// The readiness budget in milliseconds.
        millis: u64,
    },

    /// Failed to stop or remove a container.
    #[error("failed to remove container '{container_id}': {message}")]
    RemoveFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the removal failure.
        message: String,
    },

    /// Failed to pull the sidecar image.
    #[error("failed to pull image '{image}': {message}")]
    ImagePullFailed {
        /// The image reference.
        image: String,
        /// A description of the pull failure.
        message: String,
    },

    /// Failed to execute a command in a container.
    #[error("failed to execute command in container '{container_id}': {message}")]
    ExecFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the execution failure.
        message: String,
    },
}

/// Errors raised while deploying the chaos tool into a target container.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The local tool archive could not be read.
    #[error("tool archive '{path}' is unreadable: {message}")]
    ArchiveUnreadable {
        /// The archive path on the host.
        path: PathBuf,
        /// A description of the read failure.
        message: String,
    },

    /// The archive has no top-level directory to install from.
    #[error("tool archive '{path}' has no top-level directory")]
    ArchiveRootMissing {
        /// The archive path on the host.
        path: PathBuf,
    },

    /// Copying the archive into the container failed.
    #[error("failed to copy tool archive into container '{container_id}': {message}")]
    CopyFailed {
        /// The ID of the target container.
        container_id: String,
        /// A description of the copy failure.
        message: String,
    },

    /// Moving the extracted tool into its install path failed.
    #[error("failed to install tool in container '{container_id}': {message}")]
    InstallFailed {
        /// The ID of the target container.
        container_id: String,
        /// A description of the install failure.
        message: String,
    },
}

/// Top-level error type for bladedock.
#[derive(Debug, Error)]
pub enum ChaosError {
    /// An error occurred during configuration or flag validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during container engine operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// An error occurred while deploying the chaos tool.
    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl ChaosError {
    /// Return the stable outcome code reported for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config(ConfigError::MissingRequired { .. }) => ErrorCode::PARAMETER_LESS,
            Self::Config(_) => ErrorCode::PARAMETER_INVALID,
            Self::Container(error) => error.code(),
            Self::Deploy(_) => ErrorCode::DEPLOY_FAILED,
        }
    }

    /// Whether this error means the container that was looked up is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Container(ContainerError::NotFound { .. }))
    }
}

impl ContainerError {
    const fn code(&self) -> ErrorCode {
        match self {
            Self::ConnectionFailed { .. }
            | Self::SocketNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::PingTimeout { .. } => ErrorCode::ENGINE_CONNECT_FAILED,
            Self::AmbiguousInput { .. } => ErrorCode::PARAMETER_LESS,
            Self::NotFound { .. } => ErrorCode::CONTAINER_NOT_FOUND,
            Self::NameConflict { .. } => ErrorCode::SIDECAR_CONFLICT,
            Self::ImagePullFailed { .. } => ErrorCode::IMAGE_PULL_FAILED,
            Self::ListFailed { .. }
            | Self::CreateFailed { .. }
            | Self::StartFailed { .. }
            | Self::NotReady { .. }
            | Self::RemoveFailed { .. }
            | Self::ExecFailed { .. } => ErrorCode::DOCKER_EXEC_FAILED,
        }
    }
}

/// A specialised `Result` type for bladedock operations.
pub type Result<T> = std::result::Result<T, ChaosError>;
