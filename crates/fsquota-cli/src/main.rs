#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;
mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fsquota::backend::QuotaBackend;
use fsquota::testing::StubBackend;
use fsquota::{QuotaClient, QuotaError};
use tracing_subscriber::EnvFilter;

use crate::commands::{backend, mounts, query, rpc_query, set_limit, sync};
use crate::config::Config;

/// Query and manage filesystem disk quotas
#[derive(Parser)]
#[command(name = "fsquota")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Show your own quota on a device
    fsquota query /dev/vda1

    # Raise the block hard limit of user 1000, keeping the other limits
    fsquota set-limit /dev/vda1 --uid 1000 --block-hard 2000000

    # Ask an NFS server over TCP
    fsquota rpc-query nfs1 /export/home --tcp --timeout 2s

    # List filesystems mounted with quota options
    fsquota mounts --quota-only

    # Run against a fixture instead of the kernel
    fsquota --fixture quotas.toml mounts
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use an in-memory backend loaded from a TOML fixture
    #[arg(long, value_name = "FILE", env = "FSQUOTA_FIXTURE", global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show usage and limits on a local filesystem
    Query(query::Args),

    /// Change soft and hard limits
    SetLimit(set_limit::Args),

    /// Flush quota state to disk
    Sync(sync::Args),

    /// Show usage and limits from a remote rquotad
    RpcQuery(rpc_query::Args),

    /// List the system mount table
    Mounts(mounts::Args),

    /// Identify the quota backend
    Backend(backend::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            // Only print error if not quiet mode (quiet is parsed separately for this)
            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let config = Config::load()?;

    if let Some(path) = &cli.fixture {
        let stub = StubBackend::from_fixture_file(path)
            .with_context(|| format!("Failed to load fixture: {}", path.display()))?;
        tracing::debug!(fixture = %path.display(), "Using fixture backend");
        return dispatch(&QuotaClient::new(stub), &cli, &config, "fixture");
    }

    run_native(&cli, &config)
}

#[cfg(feature = "native")]
fn run_native(cli: &Cli, config: &Config) -> Result<()> {
    let client = QuotaClient::native().context("Failed to open the native quota backend")?;
    dispatch(&client, cli, config, "native")
}

#[cfg(not(feature = "native"))]
fn run_native(_cli: &Cli, _config: &Config) -> Result<()> {
    anyhow::bail!(
        "This build has no native quota backend.\n\
         Rebuild with `--features native`, or pass --fixture FILE to use a fixture."
    )
}

/// Execute a command against a client.
fn dispatch<B: QuotaBackend>(
    client: &QuotaClient<B>,
    cli: &Cli,
    config: &Config,
    source: &str,
) -> Result<()> {
    let json = config.defaults.json;
    match &cli.command {
        Commands::Query(args) => query::execute(client, args, json),
        Commands::SetLimit(args) => set_limit::execute(client, args, cli.quiet),
        Commands::Sync(args) => sync::execute(client, args, cli.quiet),
        Commands::RpcQuery(args) => rpc_query::execute(client, args, config),
        Commands::Mounts(args) => mounts::execute(client, args, json),
        Commands::Backend(args) => backend::execute(client, args, source, json),
    }
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code using typed error downcasting
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(quota_err) = cause.downcast_ref::<QuotaError>() {
            return match quota_err {
                QuotaError::Backend { message, .. } if is_privilege_message(message) => {
                    exit_code::NOT_PRIVILEGED
                }
                QuotaError::Backend { .. } => exit_code::BACKEND_ERROR,
                QuotaError::InvalidArgument { .. } => exit_code::USAGE_ERROR,
                QuotaError::CursorBusy | QuotaError::BackendUnavailable => exit_code::BUSY,
            };
        }
    }

    exit_code::GENERAL_ERROR
}

/// Backend messages that mean the caller lacks privileges.
fn is_privilege_message(message: &str) -> bool {
    let msg = message.to_lowercase();
    ["not privileged", "permission denied", "operation not permitted"]
        .iter()
        .any(|needle| msg.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_error(message: &str) -> anyhow::Error {
        anyhow::Error::new(QuotaError::Backend {
            operation: "quota_query",
            message: message.to_string(),
        })
        .context("Failed to query user quota")
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_backend_errors_map_to_exit_codes() {
        assert_eq!(categorize_error(&backend_error("Not privileged")), exit_code::NOT_PRIVILEGED);
        assert_eq!(
            categorize_error(&backend_error("Operation not permitted")),
            exit_code::NOT_PRIVILEGED
        );
        assert_eq!(
            categorize_error(&backend_error("No quota for this user")),
            exit_code::BACKEND_ERROR
        );
    }

    #[test]
    fn test_session_errors_map_to_exit_codes() {
        assert_eq!(
            categorize_error(&anyhow::Error::new(QuotaError::CursorBusy)),
            exit_code::BUSY
        );
        let invalid = QuotaError::InvalidArgument {
            argument: "device",
            reason: "contains a NUL byte at offset 3".to_string(),
        };
        assert_eq!(categorize_error(&anyhow::Error::new(invalid)), exit_code::USAGE_ERROR);
        assert_eq!(categorize_error(&anyhow::anyhow!("boom")), exit_code::GENERAL_ERROR);
    }
}
