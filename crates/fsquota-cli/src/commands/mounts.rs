//! Mounts command - list the system mount table.

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use comfy_table::{Cell, Color};
use fsquota::backend::QuotaBackend;
use fsquota::{MountEntry, QuotaClient};
use tracing::instrument;

use crate::output::table_with_header;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Only show filesystems mounted with quota options
    #[arg(long)]
    pub quota_only: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[instrument(level = "info", name = "cmd::mounts", skip_all)]
pub fn execute<B: QuotaBackend>(client: &QuotaClient<B>, args: &Args, json: bool) -> Result<()> {
    let mut enumerator = client.mounts().context("Failed to open the mount table")?;
    let mut entries = Vec::new();
    while let Some(entry) = enumerator
        .next_entry()
        .context("Failed to read the mount table")?
    {
        if !args.quota_only || entry.has_quota_options() {
            entries.push(entry);
        }
    }
    enumerator.close().context("Failed to close the mount table")?;

    if args.json || json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No mounts found.");
        return Ok(());
    }
    output_table(&entries);
    eprintln!("{} mount(s)", entries.len());
    Ok(())
}

fn output_table(entries: &[MountEntry]) {
    let mut table = table_with_header(&["Device", "Mount point", "Type", "Options"]);

    for entry in entries {
        let type_cell = Cell::new(&entry.fs_type).fg(if entry.has_quota_options() {
            Color::Green
        } else {
            Color::White
        });
        table.add_row(vec![
            Cell::new(&entry.device),
            Cell::new(&entry.mount_point),
            type_cell,
            Cell::new(&entry.options),
        ]);
    }

    println!("{table}");
}
