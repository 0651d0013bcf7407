//! Set-limit command - change soft and hard limits.
//!
//! Limits not given on the command line keep their current values, which are
//! read from the backend first.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use fsquota::backend::QuotaBackend;
use fsquota::{QuotaClient, QuotaLimits, resolve_uid};
use tracing::{info, instrument};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Device or mount point
    pub device: String,

    /// User or group id (default: the calling user)
    #[arg(long, short)]
    pub uid: Option<u32>,

    /// Change the group quota instead of the user quota
    #[arg(long, short)]
    pub group: bool,

    /// Block soft limit (1 KiB blocks, 0 = unlimited)
    #[arg(long, value_name = "BLOCKS")]
    pub block_soft: Option<u64>,

    /// Block hard limit (1 KiB blocks, 0 = unlimited)
    #[arg(long, value_name = "BLOCKS")]
    pub block_hard: Option<u64>,

    /// File soft limit (0 = unlimited)
    #[arg(long, value_name = "FILES")]
    pub file_soft: Option<u64>,

    /// File hard limit (0 = unlimited)
    #[arg(long, value_name = "FILES")]
    pub file_hard: Option<u64>,

    /// Restart the grace periods
    #[arg(long)]
    pub reset_grace: bool,
}

impl Args {
    fn apply(&self, current: QuotaLimits) -> QuotaLimits {
        QuotaLimits {
            block_soft: self.block_soft.unwrap_or(current.block_soft),
            block_hard: self.block_hard.unwrap_or(current.block_hard),
            file_soft: self.file_soft.unwrap_or(current.file_soft),
            file_hard: self.file_hard.unwrap_or(current.file_hard),
            reset_grace: self.reset_grace,
        }
    }
}

#[instrument(level = "info", name = "cmd::set_limit", skip_all, fields(device = %args.device))]
pub fn execute<B: QuotaBackend>(client: &QuotaClient<B>, args: &Args, quiet: bool) -> Result<()> {
    let kind = super::kind_from_flag(args.group);
    let uid = resolve_uid(args.uid);

    let current = client
        .query(&args.device, Some(uid), Some(kind))
        .with_context(|| format!("Failed to read current limits on {}", args.device))?
        .limits();
    let limits = args.apply(current);
    info!(?limits, "Setting limits");

    let status = client
        .set_limit(&args.device, Some(uid), &limits, Some(kind))
        .with_context(|| format!("Failed to set {kind} limits of id {uid} on {}", args.device))?;

    if !quiet {
        eprintln!("Updated {kind} limits of id {uid} on {} ({status})", args.device);
    }
    Ok(())
}
