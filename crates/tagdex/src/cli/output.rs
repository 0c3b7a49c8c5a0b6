//! Rendering and JSON serialization for CLI output.

use std::process::ExitCode;

use comfy_table::{Cell, CellAlignment, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use tagdex_document::Tag;
use tagdex_index::RecordView;

/// Most tag names shown per record in the table view.
const MAX_TAGS_SHOWN: usize = 6;

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to serialize JSON: {e}");
            ExitCode::FAILURE
        }
    }
}

/// A fresh table in the shared style.
fn table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table
}

/// A right-aligned numeric cell.
fn number(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

/// Records of one search page, one row each.
pub fn records_table(records: &[RecordView]) -> Table {
    let mut table = table();
    table.set_header(vec!["ID", "Rating", "Score", "Favs", "Size", "Type", "Tags"]);
    for record in records {
        table.add_row(vec![
            number(record.id),
            Cell::new(record.rating.to_string()),
            number(record.score),
            number(record.favorite_count),
            Cell::new(format!("{}x{}", record.width, record.height)),
            Cell::new(&record.file_type),
            Cell::new(tag_summary(record)),
        ]);
    }
    table
}

/// Leading tag names of a record, artists and species first.
fn tag_summary(record: &RecordView) -> String {
    let ordered = ["artist", "character", "species", "copyright", "general"];
    let mut names: Vec<&str> = ordered
        .iter()
        .filter_map(|category| record.tags.get(category))
        .flatten()
        .map(String::as_str)
        .collect();
    let total = record.tags.values().map(Vec::len).sum::<usize>();
    names.truncate(MAX_TAGS_SHOWN);
    let mut summary = names.join(" ");
    if total > names.len() {
        summary.push_str(&format!(" (+{})", total - names.len()));
    }
    summary
}

/// Tags, one row each.
pub fn tags_table(tags: &[Tag]) -> Table {
    let mut table = table();
    table.set_header(vec!["ID", "Name", "Category", "Posts"]);
    for tag in tags {
        table.add_row(vec![
            number(tag.id),
            Cell::new(&tag.name),
            Cell::new(tag.category.name()),
            number(tag.post_count),
        ]);
    }
    table
}

/// A two-column table of counters.
pub fn counts_table(rows: &[(&str, usize)]) -> Table {
    let mut table = table();
    table.set_header(vec!["", "Count"]);
    for (label, count) in rows {
        table.add_row(vec![Cell::new(label), number(count)]);
    }
    table
}

/// Comma-separated tag names, or a dash when there are none.
pub fn name_list(tags: &[Tag]) -> String {
    if tags.is_empty() {
        return "-".to_string();
    }
    tags.iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
