use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("fingerprint must be exactly 16 hexadecimal characters (64 bits), got {0:?}")]
    InvalidFingerprint(String),

    #[error("could not fingerprint image: {}", .0.display())]
    UnreadableImage(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("search query must not be empty")]
    EmptyQuery,

    #[error("tag name must not be empty")]
    EmptyTagName,

    #[error("item name must not be empty")]
    EmptyItemName,

    #[error("catalog password must not be empty")]
    EmptyPassword,

    #[error("hamming distance must be between 0 and 64, got {0}")]
    InvalidDistance(u32),

    #[error("unauthorized")]
    Unauthorized,

    #[error("tag id {0} does not exist in catalog")]
    TagNotInCatalog(i64),

    #[error("item {0} not found in catalog")]
    ItemNotFound(i64),

    #[error("transaction exceeded its {}ms deadline and was rolled back", .0.as_millis())]
    TransactionTimeout(Duration),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("failed to sign session token: {0}")]
    TokenEncoding(#[source] jsonwebtoken::errors::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database schema version {db} is newer than supported version {code}")]
    SchemaTooNew { db: u32, code: u32 },

    /// An import stopped partway. Items in `imported` are already committed.
    #[error("import stopped after {} item(s): {source}", .imported.len())]
    ImportInterrupted {
        imported: Vec<i64>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True for errors caused by the caller's input: validation, ownership,
    /// missing rows and authentication. Everything else is a server error.
    pub fn is_client_error(&self) -> bool {
        if let Error::ImportInterrupted { source, .. } = self {
            return source.is_client_error();
        }
        matches!(
            self,
            Error::InvalidFingerprint(_)
                | Error::UnreadableImage(_)
                | Error::NotADirectory(_)
                | Error::EmptyQuery
                | Error::EmptyTagName
                | Error::EmptyItemName
                | Error::EmptyPassword
                | Error::InvalidDistance(_)
                | Error::Unauthorized
                | Error::TagNotInCatalog(_)
                | Error::ItemNotFound(_)
        )
    }

    /// Storage failures that rolled back cleanly and may be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TransactionTimeout(_) => true,
            Error::ImportInterrupted { source, .. } => source.is_retryable(),
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
