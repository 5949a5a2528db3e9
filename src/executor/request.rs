//! Experiment descriptions handed to the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::flags;
use crate::engine::ContainerIdentity;
use crate::error::{ChaosError, ConfigError};

/// Experiment id meaning "every experiment matching the flags".
const WILDCARD_UID: &str = "*";

/// Whether a fault is being injected or reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Inject the fault.
    Create,
    /// Reverse the fault.
    Destroy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Destroy => "destroy",
        })
    }
}

/// Fault categories and the strategy each one runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCategory {
    /// CPU load.
    Cpu,
    /// Memory pressure.
    Mem,
    /// Disk fill and I/O.
    Disk,
    /// Process kill and stop.
    Process,
    /// File mutation.
    File,
    /// Network delay, loss, and DNS faults; run from a sidecar.
    Network,
    /// Actions on the target container itself.
    Container,
}

impl FaultCategory {
    /// The category's name on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Mem => "mem",
            Self::Disk => "disk",
            Self::Process => "process",
            Self::File => "file",
            Self::Network => "network",
            Self::Container => "container",
        }
    }
}

impl FromStr for FaultCategory {
    type Err = ChaosError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "mem" => Ok(Self::Mem),
            "disk" => Ok(Self::Disk),
            "process" => Ok(Self::Process),
            "file" => Ok(Self::File),
            "network" => Ok(Self::Network),
            "container" => Ok(Self::Container),
            other => Err(ChaosError::from(ConfigError::InvalidValue {
                field: String::from("target"),
                reason: format!("unsupported target '{other}'"),
            })),
        }
    }
}

/// One experiment step: target, action, phase, and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentRequest {
    target: String,
    action: String,
    phase: Phase,
    flags: BTreeMap<String, String>,
    experiment_id: Option<String>,
}

impl ExperimentRequest {
    /// Start a request with no flags and no experiment id.
    #[must_use]
    pub fn new(target: impl Into<String>, action: impl Into<String>, phase: Phase) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            phase,
            flags: BTreeMap::new(),
            experiment_id: None,
        }
    }

    /// Set one flag, replacing any earlier value.
    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    /// Set several flags.
    #[must_use]
    pub fn with_flags<I, K, V>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.flags
            .extend(flags.into_iter().map(|(name, value)| (name.into(), value.into())));
        self
    }

    /// Attach the experiment id.
    #[must_use]
    pub fn with_experiment_id(mut self, experiment_id: Option<String>) -> Self {
        self.experiment_id = experiment_id;
        self
    }

    /// Fault category name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Action name within the category.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Inject or reverse.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// All flags, sorted by name.
    #[must_use]
    pub const fn flags(&self) -> &BTreeMap<String, String> {
        &self.flags
    }

    /// A flag's trimmed value, if set and non-empty.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Whether a boolean flag is set to `true`.
    #[must_use]
    pub fn flag_enabled(&self, name: &str) -> bool {
        self.flag(name)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// The experiment id as supplied, for logging.
    #[must_use]
    pub fn experiment_id(&self) -> Option<&str> {
        self.experiment_id.as_deref()
    }

    /// The experiment id when it names one specific experiment.
    #[must_use]
    pub fn experiment_uid(&self) -> Option<&str> {
        self.experiment_id
            .as_deref()
            .map(str::trim)
            .filter(|uid| !uid.is_empty() && *uid != WILDCARD_UID)
    }

    /// The target container named by the `container-id`/`container-name`
    /// flags.
    #[must_use]
    pub fn container_identity(&self) -> ContainerIdentity {
        ContainerIdentity::new(
            self.flag(flags::CONTAINER_ID),
            self.flag(flags::CONTAINER_NAME),
        )
    }
}
