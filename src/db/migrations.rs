//! Database lifecycle and schema migrations.

use crate::error::{DatabaseError, StorageError};
use crate::{Error, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::path::{Path, PathBuf};

use super::MediaStore;

impl MediaStore {
    /// Open (or create) the database and storage root
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn open(db_path: &Path, storage_root: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        tokio::fs::create_dir_all(storage_root)
            .await
            .map_err(|e| StorageError::Unavailable {
                root: storage_root.to_path_buf(),
                reason: e.to_string(),
            })?;

        // Connect to database with foreign key enforcement and WAL mode
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let store = Self {
            pool,
            storage_root: storage_root.to_path_buf(),
        };

        store.run_migrations().await?;

        tracing::debug!(
            database = %db_path.display(),
            storage_root = %storage_root.display(),
            "Media store opened"
        );
        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?;

        let current_version = current_version.unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&mut conn).await?;
        }
        if current_version < 2 {
            Self::migrate_v2(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: album tree and media files
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        Self::begin_migration(conn).await?;

        let result = async {
            Self::execute_ddl(
                conn,
                "media_albums table",
                r#"
                CREATE TABLE media_albums (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    parent_id INTEGER REFERENCES media_albums(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    path TEXT NOT NULL UNIQUE
                )
                "#,
            )
            .await?;
            Self::execute_ddl(
                conn,
                "media_files table",
                r#"
                CREATE TABLE media_files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    album_id INTEGER NOT NULL REFERENCES media_albums(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    size_bytes INTEGER NOT NULL,
                    sha256 TEXT NOT NULL,
                    storage_path TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    UNIQUE(album_id, name COLLATE NOCASE)
                )
                "#,
            )
            .await?;
            Self::execute_ddl(
                conn,
                "index",
                "CREATE INDEX idx_media_files_sha256 ON media_files(sha256)",
            )
            .await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        Self::finish_migration(conn, 1, result).await
    }

    /// Migration v2: owner associations
    async fn migrate_v2(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v2");

        Self::begin_migration(conn).await?;

        let result = async {
            Self::execute_ddl(
                conn,
                "product_media_files table",
                r#"
                CREATE TABLE product_media_files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    product_id INTEGER NOT NULL,
                    media_file_id INTEGER NOT NULL REFERENCES media_files(id) ON DELETE CASCADE,
                    display_order INTEGER NOT NULL DEFAULT 0,
                    UNIQUE(product_id, media_file_id)
                )
                "#,
            )
            .await?;
            Self::execute_ddl(
                conn,
                "index",
                "CREATE INDEX idx_product_media_files_order ON product_media_files(product_id, display_order)",
            )
            .await?;
            Self::execute_ddl(
                conn,
                "category_images table",
                r#"
                CREATE TABLE category_images (
                    category_id INTEGER PRIMARY KEY,
                    media_file_id INTEGER NOT NULL REFERENCES media_files(id) ON DELETE CASCADE
                )
                "#,
            )
            .await?;
            Self::execute_ddl(
                conn,
                "customer_avatars table",
                r#"
                CREATE TABLE customer_avatars (
                    customer_id INTEGER PRIMARY KEY,
                    media_file_id INTEGER NOT NULL REFERENCES media_files(id) ON DELETE CASCADE
                )
                "#,
            )
            .await?;
            Self::record_migration(conn, 2).await?;
            Ok::<(), Error>(())
        }
        .await;

        Self::finish_migration(conn, 2, result).await
    }

    async fn begin_migration(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;
        Ok(())
    }

    async fn finish_migration(
        conn: &mut SqliteConnection,
        version: i32,
        result: Result<()>,
    ) -> Result<()> {
        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v{}: {}",
                            version, e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v{} complete", version);
        Ok(())
    }

    async fn execute_ddl(conn: &mut SqliteConnection, what: &str, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create {}: {}",
                what, e
            )))
        })?;
        Ok(())
    }

    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Begin a transaction to use as the import scope
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| Error::Database(DatabaseError::from_sqlx("begin transaction", e)))
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Directory holding the file blobs
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub(super) fn blob_path(&self, relative: &str) -> PathBuf {
        self.storage_root.join(relative)
    }
}
