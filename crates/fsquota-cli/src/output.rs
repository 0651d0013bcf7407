use chrono::{DateTime, Utc};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};

/// Table in the CLI's border style with a bold header row.
///
/// Columns wrap to the terminal width; mount options can get long.
pub fn table_with_header(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|title| Cell::new(title).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

/// Format a count of 1 KiB quota blocks into a human-readable size
pub fn format_blocks(blocks: u64) -> String {
    const MB: u64 = 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    match blocks {
        b if b >= TB => format!("{:.1}T", b as f64 / TB as f64),
        b if b >= GB => format!("{:.1}G", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1}M", b as f64 / MB as f64),
        b => format!("{b}K"),
    }
}

/// Format a limit, where 0 means unlimited
pub fn format_limit(limit: u64, format: fn(u64) -> String) -> String {
    if limit == 0 {
        "-".to_string()
    } else {
        format(limit)
    }
}

/// Format a grace deadline (seconds since the epoch, 0 when none is running)
pub fn format_deadline(secs: u64) -> String {
    if secs == 0 {
        return "-".to_string();
    }
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map_or_else(|| secs.to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string())
}
