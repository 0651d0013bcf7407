//! Sync command - flush quota state to disk.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use fsquota::QuotaClient;
use fsquota::backend::QuotaBackend;
use tracing::instrument;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Device to sync (default: all devices)
    pub device: Option<String>,
}

#[instrument(level = "info", name = "cmd::sync", skip_all)]
pub fn execute<B: QuotaBackend>(client: &QuotaClient<B>, args: &Args, quiet: bool) -> Result<()> {
    let target = args.device.as_deref().unwrap_or("all devices");
    let status = client
        .sync(args.device.as_deref())
        .with_context(|| format!("Failed to sync quotas of {target}"))?;

    if !quiet {
        eprintln!("Synced quotas of {target} ({status})");
    }
    Ok(())
}
