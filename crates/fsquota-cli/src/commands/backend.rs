//! Backend command - identify the quota backend in use.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use fsquota::QuotaClient;
use fsquota::backend::QuotaBackend;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

pub fn execute<B: QuotaBackend>(
    client: &QuotaClient<B>,
    args: &Args,
    source: &str,
    json: bool,
) -> Result<()> {
    let kind = client
        .backend_kind()
        .context("Failed to identify the quota backend")?;

    if args.json || json {
        let output = serde_json::json!({ "source": source, "argument_type": kind });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{source} backend, quota argument type: {kind}");
    }
    Ok(())
}
