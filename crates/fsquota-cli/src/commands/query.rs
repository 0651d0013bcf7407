//! Query command - show usage and limits on a local filesystem.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color};
use fsquota::backend::QuotaBackend;
use fsquota::{QuotaClient, QuotaKind, QuotaRecord, resolve_uid};
use tracing::instrument;

use crate::output::{format_blocks, format_deadline, format_limit, table_with_header};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Device or mount point, depending on the backend variant (see `fsquota backend`)
    pub device: String,

    /// User or group id (default: the calling user)
    #[arg(long, short)]
    pub uid: Option<u32>,

    /// Query the group quota instead of the user quota
    #[arg(long, short)]
    pub group: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::query", skip_all, fields(device = %args.device))]
pub fn execute<B: QuotaBackend>(client: &QuotaClient<B>, args: &Args, json: bool) -> Result<()> {
    let kind = super::kind_from_flag(args.group);
    let uid = resolve_uid(args.uid);
    let record = client
        .query(&args.device, Some(uid), Some(kind))
        .with_context(|| format!("Failed to query {kind} quota of id {uid} on {}", args.device))?;

    print_record(&args.device, uid, kind, &record, args.json || json)
}

/// Print a record as a table or as JSON.
pub fn print_record(
    target: &str,
    id: u32,
    kind: QuotaKind,
    record: &QuotaRecord,
    json: bool,
) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "target": target,
            "id": id,
            "kind": kind,
            "quota": record,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let mut table = table_with_header(&["", "Used", "Soft", "Hard", "Grace until"]);
    table.add_row(vec![
        Cell::new("Blocks"),
        usage_cell(
            format_blocks(record.block_usage()),
            record.is_over_block_soft_limit(),
        ),
        Cell::new(format_limit(record.block_soft_limit(), format_blocks)),
        Cell::new(format_limit(record.block_hard_limit(), format_blocks)),
        Cell::new(format_deadline(record.block_time_limit())),
    ]);
    table.add_row(vec![
        Cell::new("Files"),
        usage_cell(
            record.file_usage().to_string(),
            record.is_over_file_soft_limit(),
        ),
        Cell::new(format_limit(record.file_soft_limit(), |n| n.to_string())),
        Cell::new(format_limit(record.file_hard_limit(), |n| n.to_string())),
        Cell::new(format_deadline(record.file_time_limit())),
    ]);

    eprintln!("{kind} quota of id {id} on {target}");
    println!("{table}");
    Ok(())
}

fn usage_cell(text: String, over_soft: bool) -> Cell {
    let cell = Cell::new(text);
    if over_soft { cell.fg(Color::Red) } else { cell }
}
