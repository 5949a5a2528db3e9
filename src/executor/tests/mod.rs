//! Strategy-level tests for the chaos engine against an in-memory daemon.
//!
//! - [`fake_daemon`] - The daemon double and engine fixtures
//! - [`in_container_tests`] - Deploy-and-exec strategy
//! - [`sidecar_tests`] - Resident and ephemeral sidecars
//! - [`engine_tests`] - Dispatch, validation, container actions, deadlines

pub(crate) mod fake_daemon;
