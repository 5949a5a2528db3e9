//! Shell command execution inside running containers.
//!
//! This module wraps Bollard exec APIs behind a small trait seam so command
//! execution behaviour can be unit-tested without a live daemon. Commands run
//! through `sh -c` with both output streams attached and captured separately;
//! callers decide what the captured text means.

use std::future::Future;
use std::pin::Pin;

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, CreateExecResults, StartExecOptions, StartExecResults};
use bollard::{Docker, errors::Error as BollardError};
use futures_util::StreamExt;
use tracing::debug;

use super::EngineConnector;
use crate::error::{ChaosError, ContainerError};

/// Boxed future type returned by [`ContainerExecClient::create_exec`].
pub type CreateExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CreateExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::start_exec`].
pub type StartExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StartExecResults, BollardError>> + Send + 'a>>;

/// Behaviour required to run exec sessions.
pub trait ContainerExecClient {
    /// Create an exec session in a running container.
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_>;

    /// Start a previously created exec session.
    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;
}

impl ContainerExecClient for Docker {
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move { Self::create_exec(self, &container_id_owned, options).await })
    }

    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::start_exec(self, &exec_id_owned, options).await })
    }
}

/// Who the command runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecPrivilege {
    /// The container's configured user, unprivileged.
    #[default]
    Default,
    /// `root`, with extended privileges.
    Root,
}

impl ExecPrivilege {
    const fn is_root(self) -> bool {
        matches!(self, Self::Root)
    }
}

/// Text captured from an exec session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Everything written to standard output.
    pub stdout: String,
    /// Everything written to standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// Build output from captured text.
    #[must_use]
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether anything was written to standard error.
    #[must_use]
    pub fn has_stderr(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

/// Quote `value` for `sh -c` unless it is made only of safe characters.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c));
    if safe {
        String::from(value)
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

impl EngineConnector {
    /// Run `command` through `sh -c` and capture both output streams.
    ///
    /// Standard error is returned as data rather than treated as a failure.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ExecFailed` when the exec session cannot be
    /// created, started, or read.
    pub async fn exec_shell<C: ContainerExecClient + ?Sized>(
        client: &C,
        container_id: &str,
        command: &str,
        privilege: ExecPrivilege,
    ) -> Result<ExecOutput, ChaosError> {
        debug!(container_id, command, ?privilege, "running command in container");
        let created = client
            .create_exec(container_id, build_create_exec_options(command, privilege))
            .await
            .map_err(|error| exec_failed(container_id, format!("create exec failed: {error}")))?;

        let started = client
            .start_exec(&created.id, Some(build_start_exec_options()))
            .await
            .map_err(|error| exec_failed(container_id, format!("start exec failed: {error}")))?;

        let StartExecResults::Attached { mut output, .. } = started else {
            return Err(exec_failed(
                container_id,
                "daemon returned detached start result for attached exec",
            ));
        };

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = output.next().await {
            match chunk.map_err(|error| exec_failed(container_id, error.to_string()))? {
                LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout.extend_from_slice(&message);
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

fn build_create_exec_options(command: &str, privilege: ExecPrivilege) -> CreateExecOptions<String> {
    CreateExecOptions::<String> {
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        cmd: Some(vec![
            String::from("sh"),
            String::from("-c"),
            String::from(command),
        ]),
        privileged: privilege.is_root().then_some(true),
        user: privilege.is_root().then(|| String::from("root")),
        ..CreateExecOptions::default()
    }
}

const fn build_start_exec_options() -> StartExecOptions {
    StartExecOptions {
        detach: false,
        tty: false,
        output_capacity: None,
    }
}

pub(super) fn exec_failed(container_id: &str, message: impl Into<String>) -> ChaosError {
    ChaosError::from(ContainerError::ExecFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}
