mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tagbox_core::{Config, Tagbox};
use tracing_subscriber::EnvFilter;

/// tagbox: tag and find items by perceptual fingerprint
#[derive(Parser)]
#[command(name = "tagbox", version, about)]
struct Cli {
    /// Path to the catalog database (overrides DATABASE_URL)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Session token from `tagbox login`
    #[arg(long, env = "TAGBOX_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage catalogs
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Log in to a catalog and print a session token
    Login {
        #[arg(long, env = "TAGBOX_PASSWORD", hide_env_values = true)]
        password: String,
        /// Print the Set-Cookie value instead of the bare token
        #[arg(long)]
        cookie: bool,
    },
    /// List, create, tag and search items
    Items {
        #[command(subcommand)]
        action: ItemsAction,
    },
    /// Create and search tags
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },
    /// Show item, tag and link counts for the current catalog
    Status,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Create a catalog protected by a password
    Create {
        name: String,
        #[arg(long, env = "TAGBOX_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Subcommand)]
enum ItemsAction {
    /// List all items with their tags
    Ls,
    /// Create an item from a fingerprint or a photo
    Add {
        name: String,
        /// 16 hex characters
        #[arg(long, conflicts_with = "photo", required_unless_present = "photo")]
        fingerprint: Option<String>,
        /// Compute the fingerprint from this image
        #[arg(long)]
        photo: Option<PathBuf>,
        #[arg(long)]
        url: Option<String>,
        /// Tag id to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<i64>,
    },
    /// Replace the tags of an item (no ids clears them)
    Tag { item_id: i64, tag_ids: Vec<i64> },
    /// Find items with a similar fingerprint
    Similar {
        #[arg(conflicts_with = "photo", required_unless_present = "photo")]
        fingerprint: Option<String>,
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Maximum number of differing bits (0-64)
        #[arg(long, default_value_t = 10)]
        distance: u32,
    },
    /// Create one item per photo found under a directory
    Import {
        dir: PathBuf,
        /// Tag id to attach to every imported item (repeatable)
        #[arg(long = "tag")]
        tags: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum TagsAction {
    /// Return the id of a tag, creating it if needed
    Add { name: String },
    /// Case-insensitive substring search (max 10 results)
    Search { query: String },
    /// Tags attached to one item
    Of { item_id: i64 },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    tracing::debug!(db = %config.database_path.display(), env = ?config.environment, "opening catalog");
    let mut tagbox = Tagbox::open(&config)
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    let token = || {
        cli.token
            .as_deref()
            .context("no session: pass --token or set TAGBOX_TOKEN (see `tagbox login`)")
    };

    match cli.command {
        Commands::Catalog { action } => match action {
            CatalogAction::Create { name, password } => {
                commands::catalog::create(&mut tagbox, &name, &password, cli.json)?
            }
        },
        Commands::Login { password, cookie } => {
            commands::catalog::login(&mut tagbox, &password, cookie, cli.json)?
        }
        Commands::Items { action } => match action {
            ItemsAction::Ls => commands::items::list(&mut tagbox, token()?, cli.json)?,
            ItemsAction::Add {
                name,
                fingerprint,
                photo,
                url,
                tags,
            } => commands::items::add(
                &mut tagbox,
                token()?,
                commands::items::AddArgs {
                    name,
                    fingerprint,
                    photo,
                    url,
                    tags,
                },
                cli.json,
            )?,
            ItemsAction::Tag { item_id, tag_ids } => {
                commands::items::retag(&mut tagbox, token()?, item_id, tag_ids)?
            }
            ItemsAction::Similar {
                fingerprint,
                photo,
                distance,
            } => commands::items::similar(
                &mut tagbox,
                token()?,
                fingerprint,
                photo,
                distance,
                cli.json,
            )?,
            ItemsAction::Import { dir, tags } => {
                commands::items::import(&mut tagbox, token()?, &dir, &tags)?
            }
        },
        Commands::Tags { action } => match action {
            TagsAction::Add { name } => commands::tags::add(&mut tagbox, token()?, &name, cli.json)?,
            TagsAction::Search { query } => {
                commands::tags::search(&mut tagbox, token()?, &query, cli.json)?
            }
            TagsAction::Of { item_id } => {
                commands::tags::of_item(&mut tagbox, token()?, item_id, cli.json)?
            }
        },
        Commands::Status => commands::status::run(&mut tagbox, token()?, cli.json)?,
    }

    Ok(())
}
