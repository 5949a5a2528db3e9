//! Host-side reading of the chaos tool archive.

use std::io::{self, Read};
use std::path::Component;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{ChaosError, DeployError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Finds the top-level directory an archive extracts into.
///
/// The directory name decides which path gets moved into the install
/// location once the archive is unpacked inside a container.
pub trait ArchiveInspector: Send + Sync {
    /// Return the first top-level directory in the archive at `archive_path`.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::ArchiveUnreadable` when the archive cannot be
    /// read and `DeployError::ArchiveRootMissing` when it has no top-level
    /// directory.
    fn root_dir(&self, archive_path: &Utf8Path) -> Result<String, ChaosError>;
}

/// Reads plain or gzip-compressed tar archives in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarArchiveInspector;

impl ArchiveInspector for TarArchiveInspector {
    fn root_dir(&self, archive_path: &Utf8Path) -> Result<String, ChaosError> {
        let bytes = read_archive(archive_path)?;
        top_level_dir(&bytes)
            .map_err(|error| unreadable(archive_path, &error))?
            .ok_or_else(|| {
                ChaosError::from(DeployError::ArchiveRootMissing {
                    path: archive_path.as_std_path().to_path_buf(),
                })
            })
    }
}

/// Read the whole archive through a capability handle on its parent directory.
pub(super) fn read_archive(archive_path: &Utf8Path) -> Result<Vec<u8>, ChaosError> {
    let parent = archive_path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = archive_path.file_name().ok_or_else(|| {
        unreadable(
            archive_path,
            &io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;

    Dir::open_ambient_dir(parent, ambient_authority())
        .and_then(|dir| dir.read(file_name))
        .map_err(|error| unreadable(archive_path, &error))
}

fn top_level_dir(bytes: &[u8]) -> io::Result<Option<String>> {
    let reader: Box<dyn Read + '_> = if bytes.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(bytes))
    } else {
        Box::new(bytes)
    };

    let mut archive = Archive::new(reader);
    for entry_result in archive.entries()? {
        let entry = entry_result?;
        let is_dir = entry.header().entry_type().is_dir();
        let path = entry.path()?;
        let mut components = path
            .components()
            .filter(|component| !matches!(component, Component::CurDir));

        if let Some(Component::Normal(first)) = components.next() {
            if is_dir || components.next().is_some() {
                return Ok(Some(first.to_string_lossy().into_owned()));
            }
        }
    }
    Ok(None)
}

fn unreadable(archive_path: &Utf8Path, error: &io::Error) -> ChaosError {
    ChaosError::from(DeployError::ArchiveUnreadable {
        path: archive_path.as_std_path().to_path_buf(),
        message: error.to_string(),
    })
}
