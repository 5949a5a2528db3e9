//! Installing the chaos tool inside a target container.
//!
//! Deployment is idempotent: a privileged probe checks for the tool binary
//! first, and the archive is only copied when the tool is missing or an
//! overwrite was requested. The archive's top-level directory is resolved on
//! the host before the container is touched.

mod archive;

use std::future::Future;
use std::pin::Pin;

use bollard::query_parameters::{UploadToContainerOptions, UploadToContainerOptionsBuilder};
use bollard::{Docker, body_full};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use super::EngineConnector;
use super::exec::{ContainerExecClient, ExecPrivilege, shell_quote};
use crate::error::{ChaosError, DeployError};

pub use archive::{ArchiveInspector, TarArchiveInspector};

const PROBE_PRESENT: &str = "True";

/// Boxed future type returned by [`ContainerUploader`] implementors.
pub type UploadToContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), bollard::errors::Error>> + Send + 'a>>;

/// Behaviour required to upload an archive payload into a container.
pub trait ContainerUploader {
    /// Upload a tar archive payload into `container_id`.
    fn upload_to_container(
        &self,
        container_id: &str,
        options: Option<UploadToContainerOptions>,
        archive_bytes: Vec<u8>,
    ) -> UploadToContainerFuture<'_>;
}

impl ContainerUploader for Docker {
    fn upload_to_container(
        &self,
        container_id: &str,
        options: Option<UploadToContainerOptions>,
        archive_bytes: Vec<u8>,
    ) -> UploadToContainerFuture<'_> {
        let container_id_owned = String::from(container_id);

        Box::pin(async move {
            Self::upload_to_container(
                self,
                &container_id_owned,
                options,
                body_full(archive_bytes.into()),
            )
            .await
        })
    }
}

/// Where the tool lives inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLayout {
    staging_dir: String,
    tool_name: String,
    bin_name: String,
}

impl ToolLayout {
    /// Describe a tool unpacked under `staging_dir` and installed as
    /// `staging_dir/tool_name`, with its entry point at `bin_name`.
    #[must_use]
    pub fn new(
        staging_dir: impl Into<String>,
        tool_name: impl Into<String>,
        bin_name: impl Into<String>,
    ) -> Self {
        let staging = staging_dir.into();
        let trimmed = staging.trim_end_matches('/');
        Self {
            staging_dir: if trimmed.is_empty() {
                String::from("/")
            } else {
                String::from(trimmed)
            },
            tool_name: tool_name.into(),
            bin_name: bin_name.into(),
        }
    }

    /// The directory archives are unpacked into.
    #[must_use]
    pub fn staging_dir(&self) -> &str {
        &self.staging_dir
    }

    /// The fixed install directory.
    #[must_use]
    pub fn install_dir(&self) -> String {
        join(&self.staging_dir, &self.tool_name)
    }

    /// The tool's entry point.
    #[must_use]
    pub fn bin_path(&self) -> String {
        join(&self.install_dir(), &self.bin_name)
    }

    fn extracted_dir(&self, root_dir: &str) -> String {
        join(&self.staging_dir, root_dir)
    }
}

fn join(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// A host archive together with the directory it unpacks into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySource {
    archive_path: Utf8PathBuf,
    root_dir: String,
}

impl DeploySource {
    /// Inspect `archive_path` and record its top-level directory.
    ///
    /// # Errors
    ///
    /// Returns the inspector's `DeployError` when the archive is unreadable or
    /// has no top-level directory.
    pub fn inspect(
        archive_path: impl Into<Utf8PathBuf>,
        inspector: &dyn ArchiveInspector,
    ) -> Result<Self, ChaosError> {
        let path = archive_path.into();
        let root_dir = inspector.root_dir(&path)?;
        Ok(Self {
            archive_path: path,
            root_dir,
        })
    }

    /// The archive path on the host.
    #[must_use]
    pub fn archive_path(&self) -> &Utf8Path {
        &self.archive_path
    }

    /// The directory the archive unpacks into.
    #[must_use]
    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }
}

/// What a deployment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The tool was already installed; nothing was copied.
    AlreadyPresent,
    /// The archive was copied and installed.
    Installed,
}

impl EngineConnector {
    /// Make sure the tool is installed in `container_id`.
    ///
    /// Without `overwrite`, a privileged probe for the tool binary runs first
    /// and a hit skips the copy entirely. Otherwise the staging directory is
    /// created, the archive is uploaded and unpacked there, and the extracted
    /// directory replaces the install directory.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::CopyFailed` when staging or upload fails,
    /// `DeployError::InstallFailed` when the final move fails, and
    /// `DeployError::ArchiveUnreadable` when the archive cannot be read.
    pub async fn deploy_tool<C>(
        client: &C,
        container_id: &str,
        layout: &ToolLayout,
        source: &DeploySource,
        overwrite: bool,
    ) -> Result<DeployOutcome, ChaosError>
    where
        C: ContainerExecClient + ContainerUploader + ?Sized,
    {
        if !overwrite && Self::tool_present(client, container_id, layout).await {
            debug!(container_id, bin = %layout.bin_path(), "tool already installed");
            return Ok(DeployOutcome::AlreadyPresent);
        }

        Self::run_privileged_step(
            client,
            container_id,
            &format!("mkdir -p {}", shell_quote(layout.staging_dir())),
            copy_failed,
        )
        .await?;

        let archive_bytes = archive::read_archive(source.archive_path())?;
        let options = UploadToContainerOptionsBuilder::default()
            .path(layout.staging_dir())
            .no_overwrite_dir_non_dir(if overwrite { "false" } else { "true" })
            .build();
        client
            .upload_to_container(container_id, Some(options), archive_bytes)
            .await
            .map_err(|error| copy_failed(container_id, error.to_string()))?;

        let extracted = layout.extracted_dir(source.root_dir());
        let install_dir = layout.install_dir();
        if extracted != install_dir {
            Self::run_privileged_step(
                client,
                container_id,
                &format!(
                    "rm -rf {target} && mv {source} {target}",
                    target = shell_quote(&install_dir),
                    source = shell_quote(&extracted),
                ),
                install_failed,
            )
            .await?;
        }

        info!(container_id, install_dir = %install_dir, "installed chaos tool");
        Ok(DeployOutcome::Installed)
    }

    async fn tool_present<C: ContainerExecClient + ?Sized>(
        client: &C,
        container_id: &str,
        layout: &ToolLayout,
    ) -> bool {
        let probe = format!(
            "[ -e {} ] && echo {PROBE_PRESENT} || echo False",
            shell_quote(&layout.bin_path())
        );
        match Self::exec_shell(client, container_id, &probe, ExecPrivilege::Root).await {
            Ok(output) => output.stdout.trim() == PROBE_PRESENT,
            Err(error) => {
                debug!(container_id, %error, "tool probe failed; deploying");
                false
            }
        }
    }

    async fn run_privileged_step<C: ContainerExecClient + ?Sized>(
        client: &C,
        container_id: &str,
        command: &str,
        on_failure: fn(&str, String) -> ChaosError,
    ) -> Result<(), ChaosError> {
        let output = Self::exec_shell(client, container_id, command, ExecPrivilege::Root)
            .await
            .map_err(|error| on_failure(container_id, error.to_string()))?;
        if output.has_stderr() {
            return Err(on_failure(container_id, output.stderr.trim().to_owned()));
        }
        Ok(())
    }
}

fn copy_failed(container_id: &str, message: String) -> ChaosError {
    ChaosError::from(DeployError::CopyFailed {
        container_id: String::from(container_id),
        message,
    })
}

fn install_failed(container_id: &str, message: String) -> ChaosError {
    ChaosError::from(DeployError::InstallFailed {
        container_id: String::from(container_id),
        message,
    })
}
