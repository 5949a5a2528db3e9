//! Container engine connection and management.
//!
//! This module provides the interface to Docker-compatible container engines.
//! The daemon endpoint is resolved through a priority-based fallback chain:
//!
//! 1. The experiment's `docker-endpoint` flag (first request only)
//! 2. Configured `docker_endpoint` (`--docker-endpoint`,
//!    `BLADEDOCK_DOCKER_ENDPOINT`, or TOML, in that order)
//! 3. `DOCKER_HOST` environment variable
//! 4. `CONTAINER_HOST` environment variable
//! 5. `PODMAN_HOST` environment variable
//! 6. Platform default (`/var/run/docker.sock` on Unix)

mod connection;

pub use connection::{
    ApiVersion, ArchiveInspector, ConnectionManager, Connector, ContainerExecClient,
    ContainerFilter, ContainerIdentity, ContainerLifecycle, ContainerLister, ContainerRecord,
    ContainerRunState, ContainerState, ContainerUploader, CreateContainerFuture,
    CreateContainerRequest, CreateExecFuture, DeployOutcome, DeploySource, EngineClient,
    EngineConnector, EngineFuture, EnginePinger, EphemeralRun, ExecOutput, ExecPrivilege,
    ImageClient, ListContainersFuture, PendingRemovals, PingFailure, PingFuture, SidecarHostConfig,
    SocketResolver, StartExecFuture, TarArchiveInspector, ToolLayout, UploadToContainerFuture,
    shell_quote,
};
