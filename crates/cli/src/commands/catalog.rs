use anyhow::Result;
use serde::Serialize;
use tagbox_core::Tagbox;

use super::print_json;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginOutput<'a> {
    catalog_id: i64,
    catalog_name: &'a str,
    token: &'a str,
    cookie: String,
}

pub fn create(tagbox: &mut Tagbox, name: &str, password: &str, json: bool) -> Result<()> {
    let catalog = tagbox.create_catalog(name, password)?;
    if json {
        print_json(&serde_json::json!({ "id": catalog.id, "name": catalog.name }))?;
    } else {
        println!("Created catalog {} (id {})", catalog.name, catalog.id);
    }
    Ok(())
}

pub fn login(tagbox: &mut Tagbox, password: &str, cookie: bool, json: bool) -> Result<()> {
    let session = tagbox.login(password)?;
    if json {
        return print_json(&LoginOutput {
            catalog_id: session.catalog.id,
            catalog_name: &session.catalog.name,
            token: &session.token,
            cookie: session.cookie.to_string(),
        });
    }
    if cookie {
        println!("{}", session.cookie);
    } else {
        println!("{}", session.token);
    }
    Ok(())
}
