//! Media file records and their blobs.
//!
//! A file's bytes live at `<storage root>/<album path>/<id>-<name>`. The row is
//! written first so the blob name can carry its id; a failed blob write
//! removes the row again before the error is returned.

use crate::error::{DatabaseError, StorageError};
use crate::storage::{Album, MediaStorage, StoredFile};
use crate::utils::sha256_file;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};

use super::{MediaFileRow, MediaStore};

const SELECT_FILE: &str =
    "SELECT id, album_id, name, size_bytes, sha256, storage_path FROM media_files";

impl MediaStore {
    /// Get a media file by id
    pub async fn get_file(&self, conn: &mut SqliteConnection, id: i64) -> Result<Option<StoredFile>> {
        let row = sqlx::query_as::<_, MediaFileRow>(&format!("{} WHERE id = ?", SELECT_FILE))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to get media file", e)))?;

        Ok(row.map(|r| r.into_stored(&self.storage_root)))
    }

    /// List the files of an album, ordered by name
    pub async fn list_album_files(
        &self,
        conn: &mut SqliteConnection,
        album: &Album,
    ) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query_as::<_, MediaFileRow>(&format!(
            "{} WHERE album_id = ? ORDER BY name COLLATE NOCASE",
            SELECT_FILE
        ))
        .bind(album.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to list media files", e)))?;

        Ok(rows
            .into_iter()
            .map(|r| r.into_stored(&self.storage_root))
            .collect())
    }

    /// The storage root must still exist; anything else is a per-file problem
    async fn check_storage_root(&self) -> Result<()> {
        match tokio::fs::metadata(&self.storage_root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::Unavailable {
                root: self.storage_root.clone(),
                reason: "not a directory".to_string(),
            }
            .into()),
            Err(e) => Err(StorageError::Unavailable {
                root: self.storage_root.clone(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

/// Copy `source` to `dest` through a temporary file so readers never see a
/// half-written blob
async fn write_blob(source: &Path, dest: &Path) -> Result<()> {
    let write = async {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path(dest);
        if let Err(e) = tokio::fs::copy(source, &tmp).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        tokio::fs::rename(&tmp, dest).await?;
        Ok::<(), std::io::Error>(())
    };

    write.await.map_err(|e| {
        StorageError::WriteFailed {
            path: dest.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[async_trait]
impl MediaStorage for MediaStore {
    type Scope = SqliteConnection;

    async fn find_album(&self, scope: &mut SqliteConnection, path: &str) -> Result<Option<Album>> {
        self.find_album_by_path(scope, path).await
    }

    async fn find_file(
        &self,
        scope: &mut SqliteConnection,
        album: &Album,
        name: &str,
    ) -> Result<Option<StoredFile>> {
        let row = sqlx::query_as::<_, MediaFileRow>(&format!(
            "{} WHERE album_id = ? AND name = ? COLLATE NOCASE",
            SELECT_FILE
        ))
        .bind(album.id)
        .bind(name)
        .fetch_optional(&mut *scope)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to find media file", e)))?;

        Ok(row.map(|r| r.into_stored(&self.storage_root)))
    }

    async fn create_file(
        &self,
        scope: &mut SqliteConnection,
        album: &Album,
        name: &str,
        source: &Path,
    ) -> Result<StoredFile> {
        self.check_storage_root().await?;

        let size = tokio::fs::metadata(source).await?.len();
        let sha256 = sha256_file(source).await?;
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO media_files (
                album_id, name, size_bytes, sha256, storage_path, created_at, updated_at
            ) VALUES (?, ?, ?, ?, '', ?, ?)
            "#,
        )
        .bind(album.id)
        .bind(name)
        .bind(i64::try_from(size).unwrap_or(i64::MAX))
        .bind(&sha256)
        .bind(now)
        .bind(now)
        .execute(&mut *scope)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to insert media file", e)))?;
        let id = result.last_insert_rowid();

        let relative = format!("{}/{}-{}", album.path, id, name);
        let dest = self.blob_path(&relative);

        if let Err(e) = write_blob(source, &dest).await {
            sqlx::query("DELETE FROM media_files WHERE id = ?")
                .bind(id)
                .execute(&mut *scope)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::from_sqlx("Failed to remove media file", e))
                })?;
            return Err(e);
        }

        sqlx::query("UPDATE media_files SET storage_path = ? WHERE id = ?")
            .bind(&relative)
            .bind(id)
            .execute(&mut *scope)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::from_sqlx("Failed to update media file", e))
            })?;

        tracing::debug!(file_id = id, album = %album.path, file = name, bytes = size, "Stored media file");

        Ok(StoredFile {
            id,
            album_id: album.id,
            name: name.to_string(),
            size,
            sha256,
            storage_path: dest,
        })
    }

    async fn replace_file(
        &self,
        scope: &mut SqliteConnection,
        file_id: i64,
        source: &Path,
    ) -> Result<StoredFile> {
        self.check_storage_root().await?;

        let mut file = self
            .get_file(scope, file_id)
            .await?
            .ok_or(StorageError::FileNotFound { id: file_id })?;

        let size = tokio::fs::metadata(source).await?.len();
        let sha256 = sha256_file(source).await?;

        write_blob(source, &file.storage_path).await?;

        sqlx::query("UPDATE media_files SET size_bytes = ?, sha256 = ?, updated_at = ? WHERE id = ?")
            .bind(i64::try_from(size).unwrap_or(i64::MAX))
            .bind(&sha256)
            .bind(chrono::Utc::now().timestamp())
            .bind(file_id)
            .execute(&mut *scope)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::from_sqlx("Failed to update media file", e))
            })?;

        tracing::debug!(file_id, file = %file.name, bytes = size, "Replaced media file");

        file.size = size;
        file.sha256 = sha256;
        Ok(file)
    }

    async fn delete_file(&self, scope: &mut SqliteConnection, file_id: i64) -> Result<()> {
        let Some(file) = self.get_file(scope, file_id).await? else {
            return Ok(());
        };

        sqlx::query("DELETE FROM media_files WHERE id = ?")
            .bind(file_id)
            .execute(&mut *scope)
            .await
            .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to delete media file", e)))?;

        match tokio::fs::remove_file(&file.storage_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                file_id,
                path = %file.storage_path.display(),
                error = %e,
                "Could not remove media blob"
            ),
        }

        tracing::debug!(file_id, file = %file.name, "Deleted media file");
        Ok(())
    }
}
