//! Chaos experiments inside Docker containers.
//!
//! `bladedock` injects and reverses faults in running containers by driving
//! a chaos tool through the Docker daemon. Resource faults (CPU, memory,
//! disk, processes, files) run the tool inside the target after deploying it
//! there. Network faults run it from a sidecar container that shares the
//! target's network namespace. Container faults act on the target itself.
//!
//! # Architecture
//!
//! [`executor::ChaosEngine`] owns one lazily established daemon connection
//! and turns every request into an [`executor::ExecutionOutcome`], the same
//! JSON envelope the chaos tool prints. Daemon access goes through the small
//! traits in [`engine`], so strategies run unchanged against test doubles.
//!
//! # Modules
//!
//! - [`api`]: Orchestration entry points shared by the CLI and embedders
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Container engine connection, lookup, lifecycle, exec, and tool deployment
//! - [`error`]: Semantic error types and their stable outcome codes
//! - [`executor`]: Experiment requests, strategies, and outcome decoding

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
