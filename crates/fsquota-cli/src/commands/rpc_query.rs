//! Rpc-query command - ask a remote rquotad for usage and limits.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use fsquota::backend::QuotaBackend;
use fsquota::{QuotaClient, resolve_uid};
use tracing::instrument;

use crate::config::{Config, RpcOverrides};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// NFS server
    pub host: String,

    /// Exported path on the server
    pub path: String,

    /// User or group id (default: the calling user)
    #[arg(long, short)]
    pub uid: Option<u32>,

    /// Query the group quota instead of the user quota
    #[arg(long, short)]
    pub group: bool,

    /// rquotad port (default: ask the portmapper)
    #[arg(long)]
    pub port: Option<u16>,

    /// Use TCP instead of UDP
    #[arg(long)]
    pub tcp: bool,

    /// Per-call timeout, e.g. `4s` or `1500ms`
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[instrument(level = "info", name = "cmd::rpc_query", skip_all, fields(host = %args.host))]
pub fn execute<B: QuotaBackend>(client: &QuotaClient<B>, args: &Args, config: &Config) -> Result<()> {
    let quota_config = config.quota_with(RpcOverrides {
        port: args.port,
        tcp: args.tcp,
        timeout: args.timeout,
    });
    client
        .apply_config(&quota_config)
        .context("Failed to configure the RPC transport")?;

    let kind = super::kind_from_flag(args.group);
    let uid = resolve_uid(args.uid);
    let record = client
        .rpc_query(&args.host, &args.path, Some(uid), Some(kind))
        .with_context(|| format!("Failed to query {}:{}", args.host, args.path))?;

    let target = format!("{}:{}", args.host, args.path);
    super::query::print_record(&target, uid, kind, &record, args.json || config.defaults.json)
}
