use anyhow::Result;
use tagbox_core::Tagbox;

use super::{print_json, print_tags};

pub fn add(tagbox: &mut Tagbox, token: &str, name: &str, json: bool) -> Result<()> {
    let id = tagbox.find_or_create_tag(token, name)?;
    if json {
        print_json(&serde_json::json!({ "id": id, "name": name.trim() }))
    } else {
        println!("{id}");
        Ok(())
    }
}

pub fn search(tagbox: &mut Tagbox, token: &str, query: &str, json: bool) -> Result<()> {
    let tags = tagbox.search_tags(token, query)?;
    print_tags(&tags, json)
}

pub fn of_item(tagbox: &mut Tagbox, token: &str, item_id: i64, json: bool) -> Result<()> {
    let tags = tagbox.item_tags(token, item_id)?;
    print_tags(&tags, json)
}
