//! Album tree lookup and creation.

use crate::error::DatabaseError;
use crate::storage::Album;
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::MediaStore;

/// Normalize an album path: `/`-separated, no empty segments
pub(super) fn normalize_album_path(path: &str) -> String {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

impl MediaStore {
    /// Look up an album by path
    pub async fn find_album_by_path(
        &self,
        conn: &mut SqliteConnection,
        path: &str,
    ) -> Result<Option<Album>> {
        let path = normalize_album_path(path);
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM media_albums WHERE path = ?")
            .bind(&path)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to find album", e)))?;

        Ok(id.map(|id| Album { id, path }))
    }

    /// Get an album by path, creating every missing node along it
    pub async fn ensure_album(&self, conn: &mut SqliteConnection, path: &str) -> Result<Album> {
        let path = normalize_album_path(path);
        if path.is_empty() {
            return Err(Error::Config {
                message: "album path must not be empty".to_string(),
                key: Some("albums".to_string()),
            });
        }

        let mut parent_id: Option<i64> = None;
        let mut prefix = String::new();

        for segment in path.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            let existing: Option<i64> =
                sqlx::query_scalar("SELECT id FROM media_albums WHERE path = ?")
                    .bind(&prefix)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::from_sqlx("Failed to find album", e))
                    })?;

            let id = match existing {
                Some(id) => id,
                None => {
                    let result = sqlx::query(
                        "INSERT INTO media_albums (parent_id, name, path) VALUES (?, ?, ?)",
                    )
                    .bind(parent_id)
                    .bind(segment)
                    .bind(&prefix)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::from_sqlx("Failed to create album", e))
                    })?;
                    tracing::debug!(album = %prefix, "Created album");
                    result.last_insert_rowid()
                }
            };
            parent_id = Some(id);
        }

        match parent_id {
            Some(id) => Ok(Album { id, path }),
            None => Err(DatabaseError::NotFound(path).into()),
        }
    }
}
