//! Error types for media-import
//!
//! Errors fall into two groups:
//! - per-item failures (a bad URL, a 404, a storage write that failed) which the
//!   pipeline converts into reporting events and a failed item state
//! - fatal failures (the persistence backend is gone) which abort the whole
//!   batch and are returned to the caller
//!
//! [`Error::is_fatal`] draws the line between the two.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media-import operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-import
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Media storage error (album tree, file blobs)
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A batch was rejected before any work was done
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// Association callback rejected the file
    #[error("association failed: {0}")]
    Association(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the persistence backend or the transactional
    /// scope is unusable.
    ///
    /// Fatal errors abort the whole batch. Everything else is isolated to the
    /// item that produced it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Database(DatabaseError::ConnectionFailed(_))
            | Error::Database(DatabaseError::MigrationFailed(_)) => true,
            Error::Storage(StorageError::Unavailable { .. }) => true,
            _ => false,
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database, or the connection was lost mid-batch
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl DatabaseError {
    /// Classify a sqlx error, keeping connection loss distinguishable from a
    /// failed statement.
    pub(crate) fn from_sqlx(context: &str, e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => {
                DatabaseError::ConnectionFailed(format!("{}: {}", context, e))
            }
            sqlx::Error::RowNotFound => DatabaseError::NotFound(context.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
                DatabaseError::ConstraintViolation(format!("{}: {}", context, e))
            }
            _ => DatabaseError::QueryFailed(format!("{}: {}", context, e)),
        }
    }
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// The HTTP status code returned by the server
        status: u16,
    },

    /// The URL could not be parsed or is not absolute
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL text
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The URL scheme cannot be fetched (only http and https are supported)
    #[error("unsupported URL scheme '{scheme}' in {url}")]
    UnsupportedScheme {
        /// The URL that was requested
        url: String,
        /// The scheme that was found
        scheme: String,
    },

    /// A single attempt exceeded the per-item timeout
    #[error("timed out after {seconds:.1}s fetching {url}")]
    Timeout {
        /// The URL that was requested
        url: String,
        /// The timeout that elapsed
        seconds: f64,
    },

    /// A local source vanished between item construction and download
    #[error("local file {path} is not readable: {reason}")]
    LocalFileUnavailable {
        /// The resolved local path
        path: PathBuf,
        /// The underlying cause
        reason: String,
    },
}

/// Media storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Album path does not exist in the album tree
    #[error("album '{path}' not found")]
    AlbumNotFound {
        /// The album path that was looked up
        path: String,
    },

    /// Stored file does not exist
    #[error("media file {id} not found")]
    FileNotFound {
        /// The media file id
        id: i64,
    },

    /// Writing a file blob failed (disk full, permission denied, corrupt stream)
    #[error("failed to write {path}: {reason}")]
    WriteFailed {
        /// Blob path that was being written
        path: PathBuf,
        /// The underlying cause
        reason: String,
    },

    /// Could not find a free name in the album
    #[error("no free file name for '{name}' in album {album}")]
    NameExhausted {
        /// The requested file name
        name: String,
        /// The album path
        album: String,
    },

    /// The storage root itself cannot be used
    #[error("storage root {root} is unavailable: {reason}")]
    Unavailable {
        /// The configured storage root
        root: PathBuf,
        /// The underlying cause
        reason: String,
    },
}
