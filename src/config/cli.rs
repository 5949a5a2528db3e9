//! Command-line argument definitions for bladedock.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Command-line interface for bladedock.
#[derive(Debug, Parser)]
#[command(name = "bladedock")]
#[command(
    author,
    version,
    about = "Inject and reverse chaos experiments inside Docker containers"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Docker endpoint: socket path or URL.
    #[arg(long, global = true)]
    pub docker_endpoint: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inject a fault.
    Create(ExperimentArgs),

    /// Reverse a fault.
    Destroy(ExperimentArgs),
}

/// Arguments shared by `create` and `destroy`.
#[derive(Debug, Args)]
pub struct ExperimentArgs {
    /// Fault category, e.g. `cpu`, `network`, or `container`.
    #[arg(required = true)]
    pub target: String,

    /// Action within the category, e.g. `fullload` or `delay`.
    #[arg(required = true)]
    pub action: String,

    /// Experiment id. `*` on destroy reverses by matcher flags.
    #[arg(long)]
    pub uid: Option<String>,

    /// Experiment flag as `name=value`; a bare `name` means `true`.
    #[arg(long = "flag", value_name = "NAME=VALUE", value_parser = parse_flag)]
    pub flags: Vec<(String, String)>,
}

fn parse_flag(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw.split_once('=').unwrap_or((raw, "true"));
    let trimmed = name.trim().trim_start_matches("--");
    if trimmed.is_empty() {
        return Err(format!("flag '{raw}' has no name"));
    }
    Ok((String::from(trimmed), String::from(value)))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("time=3000", ("time", "3000"))]
    #[case("--interface=eth0", ("interface", "eth0"))]
    #[case("force", ("force", "true"))]
    #[case("content=a=b", ("content", "a=b"))]
    fn flags_split_on_first_equals(#[case] raw: &str, #[case] expected: (&str, &str)) {
        assert_eq!(
            parse_flag(raw),
            Ok((String::from(expected.0), String::from(expected.1)))
        );
    }

    #[rstest]
    fn nameless_flag_is_rejected() {
        assert!(parse_flag("=3000").is_err());
    }

    #[rstest]
    fn create_parses_target_action_and_flags() {
        let cli = Cli::try_parse_from([
            "bladedock",
            "--docker-endpoint",
            "tcp://10.0.0.5:2375",
            "create",
            "network",
            "delay",
            "--uid",
            "7c1f2a",
            "--flag",
            "container-name=web",
            "--flag",
            "time=3000",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.docker_endpoint.as_deref(), Some("tcp://10.0.0.5:2375"));
        let Commands::Create(args) = cli.command else {
            panic!("expected the create subcommand");
        };
        assert_eq!(args.target, "network");
        assert_eq!(args.action, "delay");
        assert_eq!(args.uid.as_deref(), Some("7c1f2a"));
        assert_eq!(
            args.flags,
            vec![
                (String::from("container-name"), String::from("web")),
                (String::from("time"), String::from("3000")),
            ]
        );
    }
}
