use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS catalogs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            password    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            catalog_id      INTEGER NOT NULL REFERENCES catalogs(id),
            name            TEXT NOT NULL,
            fingerprint     TEXT NOT NULL,
            fingerprint_int INTEGER NOT NULL,
            photo_url       TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_items_catalog ON items(catalog_id);
        CREATE INDEX IF NOT EXISTS idx_items_catalog_fingerprint ON items(catalog_id, fingerprint_int);

        CREATE TABLE IF NOT EXISTS tags (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            catalog_id  INTEGER NOT NULL REFERENCES catalogs(id),
            name        TEXT NOT NULL,
            UNIQUE (catalog_id, name)
        );

        CREATE TABLE IF NOT EXISTS items_tags (
            item_id     INTEGER NOT NULL REFERENCES items(id),
            tag_id      INTEGER NOT NULL REFERENCES tags(id),
            PRIMARY KEY (item_id, tag_id)
        );

        CREATE INDEX IF NOT EXISTS idx_items_tags_tag ON items_tags(tag_id);

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Stamp a fresh database with [`SCHEMA_VERSION`] and refuse databases
/// written by a newer build.
pub fn migrate(conn: &Connection) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM config WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored.map(|v| v.parse::<u32>()) {
        None => {
            conn.execute(
                "INSERT INTO config (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(Ok(db)) if db > SCHEMA_VERSION => {
            return Err(Error::SchemaTooNew {
                db,
                code: SCHEMA_VERSION,
            });
        }
        Some(Ok(_)) => {}
        Some(Err(_)) => {
            return Err(Error::Config("unreadable schema_version in database".to_string()));
        }
    }
    Ok(())
}
