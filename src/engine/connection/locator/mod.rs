//! Container lookup by id or name.
//!
//! Experiments identify their target with a `container-id` or
//! `container-name` flag. The locator turns that into a concrete
//! [`ContainerRecord`], preferring an exact name match when the daemon's
//! name filter returns several candidates.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::models::ContainerSummary;
use bollard::query_parameters::ListContainersOptions;
use tracing::debug;

use super::EngineConnector;
use crate::error::{ChaosError, ContainerError};

/// Boxed future type returned by [`ContainerLister::list_containers`].
pub type ListContainersFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<ContainerRecord>, bollard::errors::Error>> + Send + 'a>>;

/// How to narrow a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerFilter {
    /// Match containers whose id starts with the value.
    Id(String),
    /// Match containers whose name matches the value as a daemon name
    /// pattern. Anchor with `^/` and `$` for exact matches.
    Name(String),
}

impl ContainerFilter {
    /// Filter that matches only the container named exactly `name`.
    #[must_use]
    pub fn exact_name(name: &str) -> Self {
        Self::Name(format!("^/{}$", name.trim_start_matches('/')))
    }

    fn to_options(&self) -> ListContainersOptions {
        let (key, value) = match self {
            Self::Id(id) => ("id", id),
            Self::Name(name) => ("name", name),
        };
        let filters = HashMap::from([(String::from(key), vec![value.clone()])]);
        ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..ListContainersOptions::default()
        }
    }
}

/// Behaviour required to list containers, including stopped ones.
pub trait ContainerLister {
    /// List every container matching `filter`.
    fn list_containers(&self, filter: ContainerFilter) -> ListContainersFuture<'_>;
}

impl ContainerLister for Docker {
    fn list_containers(&self, filter: ContainerFilter) -> ListContainersFuture<'_> {
        let options = filter.to_options();
        Box::pin(async move {
            let summaries = Self::list_containers(self, Some(options)).await?;
            Ok(summaries.into_iter().map(ContainerRecord::from).collect())
        })
    }
}

/// Lifecycle state reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Exited.
    Exited,
    /// Being removed.
    Removing,
    /// Dead.
    Dead,
    /// A state this crate does not recognise.
    Other(String),
}

impl ContainerState {
    /// Map the daemon's state string.
    #[must_use]
    pub fn from_engine(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "exited" => Self::Exited,
            "removing" => Self::Removing,
            "dead" => Self::Dead,
            other => Self::Other(String::from(other)),
        }
    }

    /// Whether the container is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Exited => "exited",
            Self::Removing => "removing",
            Self::Dead => "dead",
            Self::Other(other) => other,
        };
        f.write_str(name)
    }
}

/// A container as seen in a daemon listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Full container id.
    pub id: String,
    /// Names, each with the daemon's leading `/`.
    pub names: Vec<String>,
    /// Image reference the container was created from.
    pub image: String,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Labels set when the container was created.
    pub labels: HashMap<String, String>,
}

impl ContainerRecord {
    /// The first name without its leading `/`, or the id when unnamed.
    #[must_use]
    pub fn primary_name(&self) -> &str {
        self.names
            .first()
            .map_or(self.id.as_str(), |name| name.trim_start_matches('/'))
    }

    /// The value of label `key`, if set.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    fn has_name(&self, name: &str) -> bool {
        let wanted = name.trim_start_matches('/');
        self.names
            .iter()
            .any(|candidate| candidate.trim_start_matches('/') == wanted)
    }
}

impl From<ContainerSummary> for ContainerRecord {
    fn from(summary: ContainerSummary) -> Self {
        Self {
            id: summary.id.unwrap_or_default(),
            names: summary.names.unwrap_or_default(),
            image: summary.image.unwrap_or_default(),
            state: summary
                .state
                .as_ref()
                .map(ToString::to_string)
                .map_or(ContainerState::Other(String::new()), |state| {
                    ContainerState::from_engine(&state)
                }),
            labels: summary.labels.unwrap_or_default(),
        }
    }
}

/// The identifying flags of an experiment target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerIdentity {
    id: Option<String>,
    name: Option<String>,
}

impl ContainerIdentity {
    /// Build an identity; blank values count as absent.
    #[must_use]
    pub fn new(id: Option<&str>, name: Option<&str>) -> Self {
        let present = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from)
        };
        Self {
            id: present(id),
            name: present(name),
        }
    }

    /// Fail when neither an id nor a name was supplied.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::AmbiguousInput` when both are absent.
    pub fn ensure_present(&self) -> Result<(), ChaosError> {
        if self.id.is_none() && self.name.is_none() {
            return Err(ChaosError::from(ContainerError::AmbiguousInput {
                fields: String::from("container-id or container-name"),
            }));
        }
        Ok(())
    }

    fn filter(&self) -> Option<ContainerFilter> {
        self.id
            .clone()
            .map(ContainerFilter::Id)
            .or_else(|| self.name.clone().map(ContainerFilter::Name))
    }

    fn identifier(&self) -> &str {
        self.id.as_deref().or(self.name.as_deref()).unwrap_or_default()
    }
}

impl EngineConnector {
    /// Resolve an experiment target to a single container.
    ///
    /// The id takes precedence when both flags are present. A name lookup
    /// prefers the candidate whose name matches exactly and otherwise takes
    /// the first candidate the daemon returned.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::AmbiguousInput` without contacting the daemon
    /// when neither flag is set, `ContainerError::NotFound` when nothing
    /// matches, and `ContainerError::ListFailed` when the listing fails.
    pub async fn resolve_container<L: ContainerLister + ?Sized>(
        lister: &L,
        identity: &ContainerIdentity,
    ) -> Result<ContainerRecord, ChaosError> {
        identity.ensure_present()?;
        let Some(filter) = identity.filter() else {
            return Err(not_found(identity.identifier()));
        };

        let candidates = lister.list_containers(filter).await.map_err(|error| {
            ChaosError::from(ContainerError::ListFailed {
                message: error.to_string(),
            })
        })?;
        debug!(
            identifier = identity.identifier(),
            candidates = candidates.len(),
            "listed candidate containers"
        );

        let exact = identity.name.as_deref().and_then(|name| {
            candidates
                .iter()
                .position(|candidate| candidate.has_name(name))
        });
        let index = if identity.id.is_some() { None } else { exact };
        candidates
            .into_iter()
            .nth(index.unwrap_or(0))
            .ok_or_else(|| not_found(identity.identifier()))
    }

    /// Find the container named exactly `name`, running or not.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ListFailed` when the listing fails.
    pub async fn find_container_by_name<L: ContainerLister + ?Sized>(
        lister: &L,
        name: &str,
    ) -> Result<Option<ContainerRecord>, ChaosError> {
        let candidates = lister
            .list_containers(ContainerFilter::exact_name(name))
            .await
            .map_err(|error| {
                ChaosError::from(ContainerError::ListFailed {
                    message: error.to_string(),
                })
            })?;
        Ok(candidates
            .into_iter()
            .find(|candidate| candidate.has_name(name)))
    }
}

fn not_found(identifier: &str) -> ChaosError {
    ChaosError::from(ContainerError::NotFound {
        identifier: String::from(identifier),
    })
}
