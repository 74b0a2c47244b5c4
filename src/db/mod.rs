//! SQLite persistence and blob storage for imported media
//!
//! [`MediaStore`] keeps the album tree and file metadata in SQLite and the file
//! bytes under a storage root directory. It implements
//! [`MediaStorage`](crate::storage::MediaStorage) with a plain
//! [`SqliteConnection`](sqlx::SqliteConnection) as the transactional scope, so
//! callers pass `&mut *tx` for a transaction they own.
//!
//! ## Submodules
//!
//! Methods on [`MediaStore`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`albums`] — Album tree lookup and creation
//! - [`files`] — Media file records and their blobs
//! - [`associations`] — Product images, category images, customer avatars

use crate::storage::StoredFile;
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::{Path, PathBuf};

mod albums;
mod associations;
mod files;
mod migrations;

pub use associations::{CategoryImages, CustomerAvatars, ProductImages};

/// Media file record from database
#[derive(Debug, Clone, FromRow)]
pub(crate) struct MediaFileRow {
    /// Unique database ID
    pub id: i64,
    /// Album the file belongs to
    pub album_id: i64,
    /// File name within the album
    pub name: String,
    /// Size in bytes
    pub size_bytes: i64,
    /// Hex SHA-256 of the content
    pub sha256: String,
    /// Blob location relative to the storage root
    pub storage_path: String,
}

impl MediaFileRow {
    fn into_stored(self, storage_root: &Path) -> StoredFile {
        StoredFile {
            id: self.id,
            album_id: self.album_id,
            name: self.name,
            size: u64::try_from(self.size_bytes).unwrap_or_default(),
            sha256: self.sha256,
            storage_path: storage_root.join(self.storage_path),
        }
    }
}

/// Image linked to a product
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ProductMediaFile {
    /// Product the image belongs to
    pub product_id: i64,
    /// Linked media file
    pub media_file_id: i64,
    /// File name
    pub name: String,
    /// Position among the product's images
    pub display_order: i32,
}

/// SQLite-backed media store
pub struct MediaStore {
    pool: SqlitePool,
    storage_root: PathBuf,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
