pub mod schema;

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use crate::domain::*;
use crate::error::{Error, Result};
use crate::fingerprint;
use crate::password::PasswordScheme;

/// Deadline applied to every transaction unless configured otherwise.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest accepted transaction deadline.
pub const MAX_TX_TIMEOUT: Duration = Duration::from_secs(600);

/// Maximum number of tags returned by [`Store::search_tags`].
pub const TAG_SEARCH_LIMIT: usize = 10;

/// SQLite VM instructions between two deadline checks.
const PROGRESS_INTERVAL: i32 = 1000;

/// SQLite-backed store for catalogs, items and tags.
///
/// Every public operation runs in its own transaction: it either commits as a
/// whole or leaves no trace. A store wraps a single connection; concurrent
/// callers open one store each on the same database file.
pub struct Store {
    conn: Connection,
    tx_timeout: Duration,
}

impl Store {
    /// Open or create a store at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(DEFAULT_TX_TIMEOUT)?;
        register_functions(&conn)?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn,
            tx_timeout: DEFAULT_TX_TIMEOUT,
        })
    }

    /// Replace the per-transaction deadline. Lock waits are bounded by the same value.
    pub fn with_tx_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() || timeout > MAX_TX_TIMEOUT {
            return Err(Error::Config(format!(
                "transaction timeout must be between 1ms and {}ms, got {}ms",
                MAX_TX_TIMEOUT.as_millis(),
                timeout.as_millis()
            )));
        }
        self.conn.busy_timeout(timeout)?;
        self.tx_timeout = timeout;
        Ok(self)
    }

    /// Run `f` inside one transaction that commits only if `f` succeeds.
    ///
    /// Statements still running past the deadline are interrupted, the
    /// transaction is rolled back and `TransactionTimeout` is returned.
    fn in_transaction<T, F>(&mut self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let timeout = self.tx_timeout;
        let deadline = Instant::now().checked_add(timeout);
        self.conn.progress_handler(
            PROGRESS_INTERVAL,
            Some(move || deadline.is_some_and(|d| Instant::now() >= d)),
        );

        let result = run_transaction(&mut self.conn, behavior, f);

        self.conn
            .progress_handler(PROGRESS_INTERVAL, None::<fn() -> bool>);

        result.map_err(|e| match e {
            Error::Database(ref db) if is_interrupted(db) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "transaction deadline exceeded");
                Error::TransactionTimeout(timeout)
            }
            other => other,
        })
    }

    // ── Catalogs ─────────────────────────────────────────────────────

    /// Insert a catalog with the scheme's digest of `password`.
    pub fn create_catalog(
        &mut self,
        name: &str,
        password: &str,
        scheme: &dyn PasswordScheme,
    ) -> Result<Catalog> {
        let digest = scheme.hash(password)?;
        let id = self.in_transaction(TransactionBehavior::Immediate, |tx| {
            tx.execute(
                "INSERT INTO catalogs (name, password) VALUES (?1, ?2)",
                params![name, digest],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        tracing::info!(catalog_id = id, scheme = scheme.name(), "catalog created");
        Ok(Catalog {
            id,
            name: name.to_string(),
        })
    }

    /// Find the catalog whose password digest matches `password`.
    ///
    /// A wrong password and a missing catalog are indistinguishable: both are
    /// `Unauthorized`. When several catalogs share a password the lowest id wins.
    pub fn authenticate(
        &mut self,
        password: &str,
        scheme: &dyn PasswordScheme,
    ) -> Result<Catalog> {
        if password.is_empty() {
            return Err(Error::Unauthorized);
        }

        let found = match scheme.lookup_digest(password) {
            Some(digest) => self.in_transaction(TransactionBehavior::Deferred, |tx| {
                Ok(tx
                    .query_row(
                        "SELECT id, name FROM catalogs WHERE password = ?1 ORDER BY id LIMIT 1",
                        params![digest],
                        |row| {
                            Ok(Catalog {
                                id: row.get(0)?,
                                name: row.get(1)?,
                            })
                        },
                    )
                    .optional()?)
            })?,
            None => {
                // Salted digests: verify row by row, after the transaction ends.
                let rows = self.in_transaction(TransactionBehavior::Deferred, |tx| {
                    let mut stmt =
                        tx.prepare("SELECT id, name, password FROM catalogs ORDER BY id")?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((
                                Catalog {
                                    id: row.get(0)?,
                                    name: row.get(1)?,
                                },
                                row.get::<_, String>(2)?,
                            ))
                        })?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    Ok(rows)
                })?;
                rows.into_iter()
                    .find(|(_, digest)| scheme.verify(password, digest))
                    .map(|(catalog, _)| catalog)
            }
        };

        match found {
            Some(catalog) => {
                tracing::debug!(catalog_id = catalog.id, "catalog authenticated");
                Ok(catalog)
            }
            None => {
                tracing::debug!("no catalog matches the supplied password");
                Err(Error::Unauthorized)
            }
        }
    }

    // ── Items ────────────────────────────────────────────────────────

    /// All items of a catalog with their tags, ordered by item id then tag name.
    pub fn list_items(&mut self, catalog_id: i64) -> Result<Vec<Item>> {
        self.in_transaction(TransactionBehavior::Deferred, |tx| {
            load_items(tx, catalog_id)
        })
    }

    /// Create an item and link its tags in one transaction. Returns the new item id.
    ///
    /// The fingerprint is validated before storage is touched. Every tag must
    /// belong to `catalog_id`; the first foreign or unknown tag aborts the whole
    /// operation, item row included. Repeated tag ids are linked once.
    pub fn create_item(&mut self, catalog_id: i64, item: &NewItem) -> Result<i64> {
        if item.name.trim().is_empty() {
            return Err(Error::EmptyItemName);
        }
        let fingerprint = fingerprint::normalize(&item.fingerprint)?;
        let fingerprint_int = fingerprint::encode(&fingerprint)?;
        let created_at = Utc::now();

        let item_id = self.in_transaction(TransactionBehavior::Immediate, |tx| {
            tx.execute(
                "INSERT INTO items (catalog_id, name, fingerprint, fingerprint_int, photo_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    catalog_id,
                    item.name,
                    fingerprint,
                    fingerprint_int,
                    item.photo_url,
                    created_at,
                ],
            )?;
            let item_id = tx.last_insert_rowid();
            link_tags(tx, catalog_id, item_id, &item.tags)?;
            Ok(item_id)
        })?;

        tracing::debug!(catalog_id, item_id, tags = item.tags.len(), "item created");
        Ok(item_id)
    }

    /// Replace the full tag set of an item owned by `catalog_id`.
    pub fn replace_item_tags(&mut self, catalog_id: i64, item_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.in_transaction(TransactionBehavior::Immediate, |tx| {
            ensure_item_in_catalog(tx, catalog_id, item_id)?;
            tx.execute(
                "DELETE FROM items_tags
                 WHERE item_id = ?1
                   AND item_id IN (SELECT id FROM items WHERE catalog_id = ?2)",
                params![item_id, catalog_id],
            )?;
            link_tags(tx, catalog_id, item_id, tag_ids)
        })?;
        tracing::debug!(catalog_id, item_id, tags = tag_ids.len(), "item tags replaced");
        Ok(())
    }

    /// Tags of one item, ordered by name.
    pub fn item_tags(&mut self, catalog_id: i64, item_id: i64) -> Result<Vec<Tag>> {
        self.in_transaction(TransactionBehavior::Deferred, |tx| {
            ensure_item_in_catalog(tx, catalog_id, item_id)?;
            let mut stmt = tx.prepare(
                "SELECT t.id, t.name
                 FROM items_tags it
                 JOIN items i ON i.id = it.item_id
                 JOIN tags t ON t.id = it.tag_id
                 WHERE it.item_id = ?1 AND i.catalog_id = ?2
                 ORDER BY t.name COLLATE NOCASE, t.name",
            )?;
            let tags = stmt
                .query_map(params![item_id, catalog_id], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    /// Items whose fingerprint differs from `fingerprint` in at most
    /// `max_distance` bits, closest first.
    pub fn similar_items(
        &mut self,
        catalog_id: i64,
        fingerprint: &str,
        max_distance: u32,
    ) -> Result<Vec<SimilarItem>> {
        if max_distance > fingerprint::BITS {
            return Err(Error::InvalidDistance(max_distance));
        }
        let probe = fingerprint::encode(fingerprint)?;

        self.in_transaction(TransactionBehavior::Deferred, |tx| {
            let mut stmt =
                tx.prepare("SELECT id, fingerprint_int FROM items WHERE catalog_id = ?1")?;
            let distances: HashMap<i64, u32> = stmt
                .query_map(params![catalog_id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .map(|(id, value)| (id, fingerprint::hamming_distance(probe, value)))
                .filter(|&(_, distance)| distance <= max_distance)
                .collect();

            if distances.is_empty() {
                return Ok(Vec::new());
            }

            let mut matches: Vec<SimilarItem> = load_items(tx, catalog_id)?
                .into_iter()
                .filter_map(|item| {
                    distances
                        .get(&item.id)
                        .map(|&distance| SimilarItem { distance, item })
                })
                .collect();
            matches.sort_by_key(|m| (m.distance, m.item.id));
            Ok(matches)
        })
    }

    // ── Tags ─────────────────────────────────────────────────────────

    /// Return the id of the tag called `name` in the catalog, creating it if needed.
    ///
    /// Insert-or-get under the `(catalog_id, name)` unique constraint, so
    /// concurrent callers racing on the same new name all get the same id.
    pub fn find_or_create_tag(&mut self, catalog_id: i64, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyTagName);
        }

        let (tag_id, created) = self.in_transaction(TransactionBehavior::Immediate, |tx| {
            let inserted = tx.execute(
                "INSERT INTO tags (catalog_id, name) VALUES (?1, ?2)
                 ON CONFLICT (catalog_id, name) DO NOTHING",
                params![catalog_id, name],
            )?;
            let tag_id: i64 = tx.query_row(
                "SELECT id FROM tags WHERE catalog_id = ?1 AND name = ?2",
                params![catalog_id, name],
                |row| row.get(0),
            )?;
            Ok((tag_id, inserted == 1))
        })?;

        tracing::debug!(catalog_id, tag_id, created, "find_or_create_tag");
        Ok(tag_id)
    }

    /// Case-insensitive substring search over a catalog's tag names,
    /// alphabetical, at most [`TAG_SEARCH_LIMIT`] results.
    pub fn search_tags(&mut self, catalog_id: i64, query: &str) -> Result<Vec<Tag>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::EmptyQuery);
        }
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));

        self.in_transaction(TransactionBehavior::Deferred, |tx| {
            let mut stmt = tx.prepare(
                "SELECT id, name FROM tags
                 WHERE catalog_id = ?1 AND fold_case(name) LIKE ?2 ESCAPE '\\'
                 ORDER BY name COLLATE NOCASE, name
                 LIMIT ?3",
            )?;
            let tags = stmt
                .query_map(params![catalog_id, pattern, TAG_SEARCH_LIMIT as i64], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    // ── Stats ────────────────────────────────────────────────────────

    /// Item, tag and link counts for one catalog in a single query.
    pub fn stats(&mut self, catalog_id: i64) -> Result<CatalogStats> {
        self.in_transaction(TransactionBehavior::Deferred, |tx| {
            let stats = tx.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM items WHERE catalog_id = ?1),
                    (SELECT COUNT(*) FROM tags WHERE catalog_id = ?1),
                    (SELECT COUNT(*) FROM items_tags it
                     JOIN items i ON i.id = it.item_id
                     WHERE i.catalog_id = ?1)",
                params![catalog_id],
                |row| {
                    Ok(CatalogStats {
                        total_items: row.get::<_, i64>(0)? as usize,
                        total_tags: row.get::<_, i64>(1)? as usize,
                        total_links: row.get::<_, i64>(2)? as usize,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    pub fn count_items(&mut self, catalog_id: i64) -> Result<usize> {
        Ok(self.stats(catalog_id)?.total_items)
    }

    /// Number of item-tag links among the catalog's items.
    pub fn count_item_tags(&mut self, catalog_id: i64) -> Result<usize> {
        Ok(self.stats(catalog_id)?.total_links)
    }
}

/// A dropped transaction rolls back, so any early return leaves no trace.
fn run_transaction<T, F>(conn: &mut Connection, behavior: TransactionBehavior, f: F) -> Result<T>
where
    F: FnOnce(&Transaction<'_>) -> Result<T>,
{
    let tx = conn.transaction_with_behavior(behavior)?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Single LEFT JOIN over items and their tags. Rows arrive sorted by item id,
/// so consecutive rows of the same item fold into one record.
fn load_items(conn: &Connection, catalog_id: i64) -> Result<Vec<Item>> {
    let mut stmt = conn.prepare(
        "SELECT i.id, i.name, i.fingerprint, i.photo_url, i.created_at, t.id, t.name
         FROM items i
         LEFT JOIN items_tags it ON it.item_id = i.id
         LEFT JOIN tags t ON t.id = it.tag_id
         WHERE i.catalog_id = ?1
         ORDER BY i.id, t.name COLLATE NOCASE, t.name",
    )?;
    let mut rows = stmt.query(params![catalog_id])?;

    let mut items: Vec<Item> = Vec::new();
    while let Some(row) = rows.next()? {
        let item_id: i64 = row.get(0)?;
        let tag_id: Option<i64> = row.get(5)?;
        let tag_name: Option<String> = row.get(6)?;

        if items.last().map(|i| i.id) != Some(item_id) {
            items.push(Item {
                id: item_id,
                name: row.get(1)?,
                fingerprint: row.get(2)?,
                photo_url: row.get(3)?,
                created_at: row.get::<_, DateTime<Utc>>(4)?,
                tags: Vec::new(),
            });
        }

        if let (Some(id), Some(name), Some(item)) = (tag_id, tag_name, items.last_mut()) {
            item.tags.push(Tag { id, name });
        }
    }
    Ok(items)
}

fn ensure_item_in_catalog(conn: &Connection, catalog_id: i64, item_id: i64) -> Result<()> {
    conn.query_row(
        "SELECT id FROM items WHERE id = ?1 AND catalog_id = ?2",
        params![item_id, catalog_id],
        |row| row.get::<_, i64>(0),
    )
    .optional()?
    .map(|_| ())
    .ok_or(Error::ItemNotFound(item_id))
}

/// Link `tag_ids` to an item after checking each tag belongs to `catalog_id`.
fn link_tags(conn: &Connection, catalog_id: i64, item_id: i64, tag_ids: &[i64]) -> Result<()> {
    let mut owned =
        conn.prepare_cached("SELECT id FROM tags WHERE id = ?1 AND catalog_id = ?2")?;
    let mut link = conn
        .prepare_cached("INSERT OR IGNORE INTO items_tags (item_id, tag_id) VALUES (?1, ?2)")?;

    for &tag_id in tag_ids {
        owned
            .query_row(params![tag_id, catalog_id], |row| row.get::<_, i64>(0))
            .optional()?
            .ok_or(Error::TagNotInCatalog(tag_id))?;
        link.execute(params![item_id, tag_id])?;
    }
    Ok(())
}

/// `fold_case(text)`: Unicode lowercase. SQLite's own `lower` and `LIKE` fold ASCII only.
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: String = ctx.get(0)?;
            Ok(text.to_lowercase())
        },
    )?;
    Ok(())
}

/// Escape `LIKE` wildcards so the query matches literally.
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn is_interrupted(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::OperationInterrupted
    )
}
