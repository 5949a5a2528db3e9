//! Orchestration API for bladedock commands.
//!
//! These functions hold the glue between parsed arguments and the
//! [`ChaosEngine`], so the CLI binary and library embedders drive
//! experiments the same way. They accept library-owned types, never print,
//! and never call `std::process::exit`.

use crate::config::ExperimentArgs;
use crate::engine::EngineClient;
use crate::executor::{ChaosEngine, ExecutionOutcome, ExperimentRequest, Phase};

/// How a finished command should be reported to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The step succeeded (exit code 0).
    Success,
    /// The step failed and may have left the target altered (exit code 1).
    Failed,
    /// The step failed but left nothing behind, e.g. a destroy that found
    /// nothing to reverse (exit code 2).
    Recoverable,
}

impl CommandOutcome {
    /// Classify an experiment outcome.
    #[must_use]
    pub const fn from_execution(outcome: &ExecutionOutcome) -> Self {
        if outcome.success {
            Self::Success
        } else if outcome.is_fatal() {
            Self::Failed
        } else {
            Self::Recoverable
        }
    }

    /// The process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::Recoverable => 2,
        }
    }
}

/// Build the experiment request described by command-line arguments.
#[must_use]
pub fn experiment_request(phase: Phase, args: &ExperimentArgs) -> ExperimentRequest {
    ExperimentRequest::new(args.target.trim(), args.action.trim(), phase)
        .with_flags(args.flags.iter().cloned())
        .with_experiment_id(args.uid.clone())
}

/// Run one experiment step described by command-line arguments.
pub async fn run_experiment<C: EngineClient>(
    engine: &ChaosEngine<C>,
    phase: Phase,
    args: &ExperimentArgs,
) -> ExecutionOutcome {
    engine.execute(&experiment_request(phase, args)).await
}

#[cfg(test)]
mod tests;
