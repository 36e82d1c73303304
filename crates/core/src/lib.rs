pub mod config;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod import;
pub mod password;
pub mod session;
pub mod store;

use std::path::{Path, PathBuf};

pub use config::Config;
pub use error::{Error, Result};
pub use import::ImportProgress;

use domain::*;
use password::PasswordScheme;
use session::{SessionAuthenticator, SessionCookie};
use store::Store;

/// A successful login: the catalog, its signed token and the cookie carrying it.
#[derive(Debug, Clone)]
pub struct Session {
    pub catalog: Catalog,
    pub token: String,
    pub cookie: SessionCookie,
}

/// Outcome of [`Tagbox::import_directory`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub item_ids: Vec<i64>,
    pub skipped: Vec<PathBuf>,
}

/// The main entry point for the tagbox library.
///
/// Every catalog-scoped operation takes a session token; the catalog id is
/// derived from it and never supplied by the caller.
pub struct Tagbox {
    store: Store,
    sessions: SessionAuthenticator,
    scheme: Box<dyn PasswordScheme>,
}

impl Tagbox {
    /// Open the database named by `config` and wire sessions and password
    /// hashing from it. Insecure settings are refused in production.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate_for_production()?;
        let store = Store::open(&config.database_path)?.with_tx_timeout(config.tx_timeout)?;
        let sessions = config.session_authenticator();
        tracing::debug!(path = %config.database_path.display(), "tagbox opened");
        Ok(Self::from_parts(store, sessions, config.password_scheme.build()))
    }

    pub fn from_parts(
        store: Store,
        sessions: SessionAuthenticator,
        scheme: Box<dyn PasswordScheme>,
    ) -> Self {
        Self {
            store,
            sessions,
            scheme,
        }
    }

    pub fn sessions(&self) -> &SessionAuthenticator {
        &self.sessions
    }

    // ── Catalogs & sessions ──────────────────────────────────────────

    pub fn create_catalog(&mut self, name: &str, password: &str) -> Result<Catalog> {
        if password.is_empty() {
            return Err(Error::EmptyPassword);
        }
        self.store.create_catalog(name, password, self.scheme.as_ref())
    }

    /// Authenticate by password and issue a session.
    pub fn login(&mut self, password: &str) -> Result<Session> {
        let catalog = self.store.authenticate(password, self.scheme.as_ref())?;
        let token = self.sessions.issue(&catalog)?;
        let cookie = self.sessions.cookie(token.clone());
        tracing::info!(catalog_id = catalog.id, "login");
        Ok(Session {
            catalog,
            token,
            cookie,
        })
    }

    /// Catalog id carried by a valid token.
    pub fn catalog_id(&self, token: &str) -> Result<i64> {
        self.sessions
            .validate(token)?
            .catalog_id()
            .ok_or(Error::Unauthorized)
    }

    // ── Items ────────────────────────────────────────────────────────

    pub fn list_items(&mut self, token: &str) -> Result<Vec<Item>> {
        let catalog_id = self.catalog_id(token)?;
        self.store.list_items(catalog_id)
    }

    pub fn create_item(&mut self, token: &str, item: &NewItem) -> Result<i64> {
        let catalog_id = self.catalog_id(token)?;
        self.store.create_item(catalog_id, item)
    }

    pub fn replace_item_tags(&mut self, token: &str, item_id: i64, payload: &ReplaceTags) -> Result<()> {
        let catalog_id = self.catalog_id(token)?;
        self.store.replace_item_tags(catalog_id, item_id, &payload.tags)
    }

    pub fn item_tags(&mut self, token: &str, item_id: i64) -> Result<Vec<Tag>> {
        let catalog_id = self.catalog_id(token)?;
        self.store.item_tags(catalog_id, item_id)
    }

    pub fn similar_items(
        &mut self,
        token: &str,
        fingerprint: &str,
        max_distance: u32,
    ) -> Result<Vec<SimilarItem>> {
        let catalog_id = self.catalog_id(token)?;
        self.store.similar_items(catalog_id, fingerprint, max_distance)
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub fn find_or_create_tag(&mut self, token: &str, name: &str) -> Result<i64> {
        let catalog_id = self.catalog_id(token)?;
        self.store.find_or_create_tag(catalog_id, name)
    }

    pub fn search_tags(&mut self, token: &str, query: &str) -> Result<Vec<Tag>> {
        let catalog_id = self.catalog_id(token)?;
        self.store.search_tags(catalog_id, query)
    }

    pub fn status(&mut self, token: &str) -> Result<CatalogStats> {
        let catalog_id = self.catalog_id(token)?;
        self.store.stats(catalog_id)
    }

    // ── Import ───────────────────────────────────────────────────────

    /// Create one item per decodable photo under `dir`, each linked to `tag_ids`.
    /// Fingerprints are computed in parallel; items are written one transaction
    /// each, in path order.
    ///
    /// A write failure stops the import with [`Error::ImportInterrupted`],
    /// which lists the items committed before it.
    pub fn import_directory(
        &mut self,
        token: &str,
        dir: &Path,
        tag_ids: &[i64],
        mut progress_cb: Option<&mut dyn FnMut(ImportProgress)>,
    ) -> Result<ImportSummary> {
        let catalog_id = self.catalog_id(token)?;
        let paths = import::discover_images(dir)?;

        if let Some(ref mut cb) = progress_cb {
            cb(ImportProgress::Start { total: paths.len() });
        }

        let (photos, skipped) = import::fingerprint_all(&paths);

        let mut summary = ImportSummary::default();
        for photo in photos {
            let item = NewItem {
                name: import::item_name(&photo.path),
                fingerprint: photo.fingerprint,
                photo_url: Some(photo.path.to_string_lossy().to_string()),
                tags: tag_ids.to_vec(),
            };
            let item_id = match self.store.create_item(catalog_id, &item) {
                Ok(id) => id,
                Err(source) => {
                    tracing::warn!(
                        catalog_id,
                        imported = summary.item_ids.len(),
                        error = %source,
                        "import interrupted"
                    );
                    return Err(Error::ImportInterrupted {
                        imported: summary.item_ids,
                        source: Box::new(source),
                    });
                }
            };
            summary.item_ids.push(item_id);
            if let Some(ref mut cb) = progress_cb {
                cb(ImportProgress::Imported {
                    path: photo.path,
                    item_id,
                });
            }
        }

        // Report skips sequentially (callback is not Send)
        for path in &skipped {
            if let Some(ref mut cb) = progress_cb {
                cb(ImportProgress::Skipped { path: path.clone() });
            }
        }
        summary.skipped = skipped;

        if let Some(ref mut cb) = progress_cb {
            cb(ImportProgress::Complete {
                imported: summary.item_ids.len(),
                skipped: summary.skipped.len(),
            });
        }
        tracing::info!(
            catalog_id,
            imported = summary.item_ids.len(),
            skipped = summary.skipped.len(),
            "import finished"
        );
        Ok(summary)
    }
}
