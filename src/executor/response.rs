//! Outcome envelope, stable codes, and decoding of tool output.
//!
//! The chaos tool prints one JSON envelope on stdout:
//! `{"code": 200, "success": true, "result": "..."}`. The decoder turns the
//! captured output of an exec, or the error that prevented it, into the same
//! envelope so callers only ever see an [`ExecutionOutcome`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::ExecOutput;
use crate::error::ChaosError;

const NO_RESULT_MESSAGE: &str =
    "cannot get result message from docker container, please execute recovery and try again";

/// A stable numeric outcome code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(i32);

impl ErrorCode {
    /// The operation succeeded.
    pub const OK: Self = Self(200);
    /// A required flag was missing.
    pub const PARAMETER_LESS: Self = Self(40100);
    /// A flag or target was invalid.
    pub const PARAMETER_INVALID: Self = Self(40101);
    /// The target container does not exist.
    pub const CONTAINER_NOT_FOUND: Self = Self(40200);
    /// A destroy found nothing left to destroy.
    pub const ALREADY_DESTROYED: Self = Self(40201);
    /// The daemon could not be reached or verified.
    pub const ENGINE_CONNECT_FAILED: Self = Self(40300);
    /// A daemon call or in-container command failed.
    pub const DOCKER_EXEC_FAILED: Self = Self(40301);
    /// The sidecar image could not be pulled.
    pub const IMAGE_PULL_FAILED: Self = Self(40302);
    /// Another caller created the same sidecar concurrently; retry.
    pub const SIDECAR_CONFLICT: Self = Self(40303);
    /// The chaos tool could not be installed.
    pub const DEPLOY_FAILED: Self = Self(40400);
    /// The tool's output was not a valid envelope.
    pub const RESULT_DECODE_FAILED: Self = Self(40500);
    /// The operation exceeded its deadline.
    pub const TIMEOUT: Self = Self(40600);

    /// Wrap a raw code reported by the tool.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// The numeric value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Whether a failure with this code leaves nothing to clean up.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self.0, 40201 | 40303)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single artifact returned for every experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Stable outcome code.
    pub code: ErrorCode,
    /// Whether the experiment step succeeded.
    pub success: bool,
    /// Human-readable failure message.
    #[serde(rename = "error", default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Opaque payload from the tool, typically the experiment id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ExecutionOutcome {
    /// A successful outcome with an optional payload.
    #[must_use]
    pub const fn success(result: Option<Value>) -> Self {
        Self {
            code: ErrorCode::OK,
            success: true,
            message: String::new(),
            result,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            success: false,
            message: message.into(),
            result: None,
        }
    }

    /// Report an error as a failed outcome with its stable code.
    #[must_use]
    pub fn from_error(error: &ChaosError) -> Self {
        Self::failure(error.code(), error.to_string())
    }

    /// Report a destroy that found nothing to act on.
    #[must_use]
    pub fn already_destroyed(error: &ChaosError) -> Self {
        Self::failure(
            ErrorCode::ALREADY_DESTROYED,
            format!("already destroyed: {error}"),
        )
    }

    /// Whether the caller should treat this outcome as a hard failure.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.success && !self.code.is_recoverable()
    }

    /// Parse a tool envelope.
    fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Turns exec results into outcomes.
pub struct ResponseDecoder;

impl ResponseDecoder {
    /// Decode the result of running the tool.
    ///
    /// - A transport error becomes a failure carrying that error's code.
    /// - Non-empty stderr is a failure. A failure envelope on stderr keeps
    ///   its own code; anything else is reported as `DOCKER_EXEC_FAILED`.
    /// - Empty stdout yields `fallback` when given, otherwise a failure.
    /// - Stdout that is not an envelope becomes `RESULT_DECODE_FAILED`.
    #[must_use]
    pub fn decode(
        result: Result<ExecOutput, ChaosError>,
        fallback: Option<ExecutionOutcome>,
    ) -> ExecutionOutcome {
        let output = match result {
            Ok(output) => output,
            Err(error) => return ExecutionOutcome::from_error(&error),
        };

        if output.has_stderr() {
            let stderr = output.stderr.trim();
            return ExecutionOutcome::parse(stderr)
                .filter(|envelope| !envelope.success)
                .unwrap_or_else(|| {
                    ExecutionOutcome::failure(ErrorCode::DOCKER_EXEC_FAILED, stderr)
                });
        }

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            return fallback.unwrap_or_else(|| {
                ExecutionOutcome::failure(ErrorCode::DOCKER_EXEC_FAILED, NO_RESULT_MESSAGE)
            });
        }

        ExecutionOutcome::parse(stdout).unwrap_or_else(|| {
            ExecutionOutcome::failure(ErrorCode::RESULT_DECODE_FAILED, stdout)
        })
    }
}
