pub mod catalog;
pub mod items;
pub mod status;
pub mod tags;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use tagbox_core::domain::Tag;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.iter().map(Cell::new).collect::<Vec<_>>());
    table
}

/// Comma-separated tag names, or a dim dash when there are none.
pub(crate) fn tags_cell(tags: &[Tag]) -> Cell {
    if tags.is_empty() {
        Cell::new("\u{2014}").fg(Color::DarkGrey)
    } else {
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        Cell::new(names.join(", ")).fg(Color::Cyan)
    }
}

pub(crate) fn print_tags(tags: &[Tag], json: bool) -> Result<()> {
    if json {
        return print_json(tags);
    }
    if tags.is_empty() {
        println!("  No tags.");
        return Ok(());
    }
    let mut table = new_table(&["ID", "Name"]);
    for tag in tags {
        table.add_row(vec![Cell::new(tag.id), Cell::new(&tag.name)]);
    }
    println!("{table}");
    Ok(())
}
