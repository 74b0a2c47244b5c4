//! Storage and association seams of the commit stage
//!
//! [`MediaStorage`] is the album-scoped content store; [`MediaAssociation`]
//! attaches stored files to their owning entities. Both operate inside a
//! caller-owned transactional scope (`MediaStorage::Scope`), which the
//! pipeline writes within but never opens, commits or rolls back.
//!
//! [`MediaStore`](crate::db::MediaStore) implements both on SQLite.

use crate::error::Result;
use crate::types::{ExistingFile, OwnerRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Node of the media album tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    /// Album id
    pub id: i64,
    /// `/`-separated path from the root, e.g. `catalog/products`
    pub path: String,
}

/// A file held by the content store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Media file id
    pub id: i64,
    /// Album the file lives in
    pub album_id: i64,
    /// File name, unique within the album (case-insensitive)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
    /// Location of the blob
    pub storage_path: PathBuf,
}

/// Album-scoped content store
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Transactional scope handed in by the caller
    type Scope: Send;

    /// Look up an album by path
    async fn find_album(&self, scope: &mut Self::Scope, path: &str) -> Result<Option<Album>>;

    /// Look up a file by name within an album
    async fn find_file(
        &self,
        scope: &mut Self::Scope,
        album: &Album,
        name: &str,
    ) -> Result<Option<StoredFile>>;

    /// Store the bytes at `source` as a new file called `name`
    async fn create_file(
        &self,
        scope: &mut Self::Scope,
        album: &Album,
        name: &str,
        source: &Path,
    ) -> Result<StoredFile>;

    /// Replace the bytes of an existing file, keeping its id
    async fn replace_file(
        &self,
        scope: &mut Self::Scope,
        file_id: i64,
        source: &Path,
    ) -> Result<StoredFile>;

    /// Remove a file created earlier in the same scope, bytes included
    ///
    /// Used when a new file cannot be attached to its owner. Deleting an
    /// unknown id is not an error.
    async fn delete_file(&self, scope: &mut Self::Scope, file_id: i64) -> Result<()>;
}

/// Attaches stored files to owning entities
///
/// Held by the commit stage for the duration of one batch.
#[async_trait]
pub trait MediaAssociation<C: Send>: Send + Sync {
    /// Attach `file` to `owner` at `display_order`
    ///
    /// Returns the descriptor recorded in the batch's existing-file index so
    /// later items see the new file.
    async fn add_media_file(
        &self,
        scope: &mut C,
        owner: &OwnerRef,
        file: &StoredFile,
        display_order: i32,
    ) -> Result<ExistingFile>;

    /// Whether the content at `candidate` is already attached to `owner`
    async fn check_assigned_file(
        &self,
        _scope: &mut C,
        _owner: &OwnerRef,
        _candidate: &Path,
    ) -> Result<bool> {
        Ok(false)
    }
}
