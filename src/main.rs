//! `bladedock` application entry point.
//!
//! Runs one experiment step and prints its outcome envelope as JSON on
//! stdout. Logs go to stderr, filtered by `RUST_LOG` (default `info`).
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/bladedock/config.toml` or path from `BLADEDOCK_CONFIG_PATH`)
//! 3. Environment variables (`BLADEDOCK_*`)
//! 4. Command-line arguments
//!
//! Exit codes: 0 on success, 1 on a fatal failure, 2 when the step failed
//! without leaving anything behind.

use std::process::ExitCode;

use bladedock::api::{CommandOutcome, run_experiment};
use bladedock::config::{Cli, Commands, load_config};
use bladedock::executor::{ChaosEngine, ExecutionOutcome, Phase};
use clap::Parser;
use eyre::{Report, Result as EyreResult, WrapErr};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Configuration and setup errors surface as `eyre` reports; experiment
/// failures are reported through the outcome envelope and the exit code.
fn main() -> EyreResult<ExitCode> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;
    let engine = ChaosEngine::from_config(&config, &mockable::DefaultEnv::new())
        .map_err(Report::from)?;

    let (phase, args) = match &cli.command {
        Commands::Create(args) => (Phase::Create, args),
        Commands::Destroy(args) => (Phase::Destroy, args),
    };

    let runtime = tokio::runtime::Runtime::new().wrap_err("failed to start async runtime")?;
    let outcome = runtime.block_on(run_experiment(&engine, phase, args));

    print_outcome(&outcome)?;
    Ok(ExitCode::from(
        CommandOutcome::from_execution(&outcome).exit_code(),
    ))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[expect(clippy::print_stdout, reason = "the outcome envelope is the CLI's output")]
fn print_outcome(outcome: &ExecutionOutcome) -> EyreResult<()> {
    let json = serde_json::to_string(outcome).wrap_err("failed to serialise outcome")?;
    println!("{json}");
    Ok(())
}
