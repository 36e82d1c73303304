use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use comfy_table::{Cell, Color};
use indicatif::{ProgressBar, ProgressStyle};
use tagbox_core::domain::{Item, NewItem, ReplaceTags};
use tagbox_core::fingerprint::dhash;
use tagbox_core::{Error, ImportProgress, Tagbox};

use super::{new_table, print_json, tags_cell};

pub struct AddArgs {
    pub name: String,
    pub fingerprint: Option<String>,
    pub photo: Option<PathBuf>,
    pub url: Option<String>,
    pub tags: Vec<i64>,
}

fn resolve_fingerprint(fingerprint: Option<String>, photo: Option<&Path>) -> Result<String> {
    match (fingerprint, photo) {
        (Some(fp), _) => Ok(fp),
        (None, Some(path)) => Ok(dhash::fingerprint_image(path)?),
        (None, None) => bail!("pass a fingerprint or --photo"),
    }
}

fn add_item_row(table: &mut comfy_table::Table, item: &Item) {
    table.add_row(vec![
        Cell::new(item.id),
        Cell::new(&item.name),
        Cell::new(&item.fingerprint).fg(Color::DarkGrey),
        tags_cell(&item.tags),
        Cell::new(item.created_at.format("%Y-%m-%d %H:%M")),
    ]);
}

pub fn list(tagbox: &mut Tagbox, token: &str, json: bool) -> Result<()> {
    let items = tagbox.list_items(token)?;
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("  No items.");
        return Ok(());
    }

    let mut table = new_table(&["ID", "Name", "Fingerprint", "Tags", "Created"]);
    for item in &items {
        add_item_row(&mut table, item);
    }
    println!("{table}");
    Ok(())
}

pub fn add(tagbox: &mut Tagbox, token: &str, args: AddArgs, json: bool) -> Result<()> {
    let photo_url = args
        .url
        .or_else(|| args.photo.as_ref().map(|p| p.to_string_lossy().to_string()));
    let item = NewItem {
        name: args.name,
        fingerprint: resolve_fingerprint(args.fingerprint, args.photo.as_deref())?,
        photo_url,
        tags: args.tags,
    };
    let id = tagbox.create_item(token, &item)?;
    if json {
        print_json(&serde_json::json!({ "id": id }))
    } else {
        println!("{id}");
        Ok(())
    }
}

pub fn retag(tagbox: &mut Tagbox, token: &str, item_id: i64, tag_ids: Vec<i64>) -> Result<()> {
    let count = tag_ids.len();
    tagbox.replace_item_tags(token, item_id, &ReplaceTags { tags: tag_ids })?;
    println!("Item {item_id} now has {count} tag(s)");
    Ok(())
}

pub fn similar(
    tagbox: &mut Tagbox,
    token: &str,
    fingerprint: Option<String>,
    photo: Option<PathBuf>,
    distance: u32,
    json: bool,
) -> Result<()> {
    let probe = resolve_fingerprint(fingerprint, photo.as_deref())?;
    let matches = tagbox.similar_items(token, &probe, distance)?;
    if json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("  No items within {distance} bits of {probe}.");
        return Ok(());
    }

    let mut table = new_table(&["Dist", "ID", "Name", "Fingerprint", "Tags"]);
    for m in &matches {
        let color = if m.distance == 0 { Color::Green } else { Color::Yellow };
        table.add_row(vec![
            Cell::new(m.distance).fg(color),
            Cell::new(m.item.id),
            Cell::new(&m.item.name),
            Cell::new(&m.item.fingerprint).fg(Color::DarkGrey),
            tags_cell(&m.item.tags),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.green} {prefix:.green} {msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

pub fn import(tagbox: &mut Tagbox, token: &str, dir: &Path, tags: &[i64]) -> Result<()> {
    let pb = ProgressBar::hidden();
    let mut skipped_paths: Vec<PathBuf> = Vec::new();

    let result = tagbox.import_directory(
        token,
        dir,
        tags,
        Some(&mut |progress| match progress {
            ImportProgress::Start { total } => {
                println!();
                println!("  Importing {} ({total} photos)", dir.display());
                pb.set_length(total as u64);
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb.set_style(active_style());
                pb.set_prefix("Fingerprinting");
                pb.enable_steady_tick(std::time::Duration::from_millis(80));
            }
            ImportProgress::Imported { path, .. } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                pb.set_prefix("Importing");
                pb.set_message(name);
                pb.inc(1);
            }
            ImportProgress::Skipped { path } => {
                pb.inc(1);
                skipped_paths.push(path);
            }
            ImportProgress::Complete { imported, skipped } => {
                pb.set_style(done_style());
                pb.set_prefix("done");
                pb.finish_with_message(format!("Imported {imported}, skipped {skipped}"));
            }
        }),
    );

    if let Err(Error::ImportInterrupted { imported, source }) = &result {
        pb.abandon();
        tracing::warn!(committed = imported.len(), error = %source, "import interrupted");
        println!("  {} item(s) were imported before the failure", imported.len());
    }
    result?;

    for path in &skipped_paths {
        println!("  skipped (unreadable): {}", path.display());
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_fingerprint_prefers_explicit_value() {
        let fp = resolve_fingerprint(Some("00000000000000ff".to_string()), None).unwrap();
        assert_eq!(fp, "00000000000000ff");
    }

    #[test]
    fn test_resolve_fingerprint_requires_a_source() {
        assert!(resolve_fingerprint(None, None).is_err());
    }

    #[test]
    fn test_resolve_fingerprint_from_unreadable_photo_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"nope").unwrap();
        assert!(resolve_fingerprint(None, Some(&path)).is_err());
    }
}
