use anyhow::Result;
use comfy_table::Cell;
use tagbox_core::Tagbox;

use super::{new_table, print_json};

pub fn run(tagbox: &mut Tagbox, token: &str, json: bool) -> Result<()> {
    let catalog_id = tagbox.catalog_id(token)?;
    let stats = tagbox.status(token)?;

    if json {
        return print_json(&serde_json::json!({
            "catalogId": catalog_id,
            "items": stats.total_items,
            "tags": stats.total_tags,
            "links": stats.total_links,
        }));
    }

    let mut table = new_table(&["Catalog", "Items", "Tags", "Links"]);
    table.add_row(vec![
        Cell::new(catalog_id),
        Cell::new(stats.total_items),
        Cell::new(stats.total_tags),
        Cell::new(stats.total_links),
    ]);
    println!();
    println!("{table}");
    println!();
    Ok(())
}
