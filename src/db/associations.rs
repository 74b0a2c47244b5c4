//! Product images, category images and customer avatars.
//!
//! Products hold an ordered list of images in `product_media_files`.
//! Categories and customers hold at most one file each; assigning a new one
//! replaces the reference.

use crate::commit::descriptor;
use crate::error::DatabaseError;
use crate::storage::{MediaAssociation, StoredFile};
use crate::types::{ExistingFile, ExistingFileIndex, OwnerKind, OwnerRef};
use crate::utils::sha256_file;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{FromRow, SqliteConnection};
use std::path::Path;

use super::{MediaStore, ProductMediaFile};

/// SQLite bind variable limit is 999; stay well below it
const MAX_OWNERS_PER_QUERY: usize = 500;

#[derive(FromRow)]
struct ExistingRow {
    owner_id: i64,
    media_file_id: i64,
    name: String,
    size_bytes: i64,
    sha256: String,
    display_order: i32,
}

impl From<ExistingRow> for ExistingFile {
    fn from(row: ExistingRow) -> Self {
        Self {
            file_id: row.media_file_id,
            name: row.name,
            size: u64::try_from(row.size_bytes).unwrap_or_default(),
            sha256: Some(row.sha256),
            display_order: row.display_order,
        }
    }
}

/// Table holding the single file reference of an owner kind
fn single_ref_table(kind: OwnerKind) -> Option<(&'static str, &'static str)> {
    match kind {
        OwnerKind::Product => None,
        OwnerKind::Category => Some(("category_images", "category_id")),
        OwnerKind::Customer => Some(("customer_avatars", "customer_id")),
    }
}

impl MediaStore {
    /// Link a file to a product, or move an existing link to `display_order`
    pub async fn link_product_file(
        conn: &mut SqliteConnection,
        product_id: i64,
        media_file_id: i64,
        display_order: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_media_files (product_id, media_file_id, display_order)
            VALUES (?, ?, ?)
            ON CONFLICT(product_id, media_file_id) DO UPDATE SET display_order = excluded.display_order
            "#,
        )
        .bind(product_id)
        .bind(media_file_id)
        .bind(display_order)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to link product image", e)))?;

        Ok(())
    }

    /// Images of a product, ordered by display order
    pub async fn product_files(
        conn: &mut SqliteConnection,
        product_id: i64,
    ) -> Result<Vec<ProductMediaFile>> {
        sqlx::query_as::<_, ProductMediaFile>(
            r#"
            SELECT pm.product_id, pm.media_file_id, f.name, pm.display_order
            FROM product_media_files pm
            JOIN media_files f ON f.id = pm.media_file_id
            WHERE pm.product_id = ?
            ORDER BY pm.display_order ASC, pm.id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to list product images", e)))
    }

    /// Point a category or customer at a file, replacing any previous one
    pub async fn assign_file(
        conn: &mut SqliteConnection,
        owner: &OwnerRef,
        media_file_id: i64,
    ) -> Result<()> {
        let Some((table, column)) = single_ref_table(owner.kind) else {
            return Self::link_product_file(conn, owner.id, media_file_id, 0).await;
        };

        sqlx::query(&format!(
            "INSERT INTO {table} ({column}, media_file_id) VALUES (?, ?) \
             ON CONFLICT({column}) DO UPDATE SET media_file_id = excluded.media_file_id"
        ))
        .bind(owner.id)
        .bind(media_file_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to assign media file", e)))?;

        Ok(())
    }

    /// The file currently assigned to a category or customer
    pub async fn assigned_file(
        &self,
        conn: &mut SqliteConnection,
        owner: &OwnerRef,
    ) -> Result<Option<StoredFile>> {
        let Some((table, column)) = single_ref_table(owner.kind) else {
            return Ok(None);
        };

        let id: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT media_file_id FROM {table} WHERE {column} = ?"
        ))
        .bind(owner.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::Database(DatabaseError::from_sqlx("Failed to get assigned file", e)))?;

        match id {
            Some(id) => self.get_file(conn, id).await,
            None => Ok(None),
        }
    }

    /// Load the files already attached to `owners`
    pub async fn load_existing_files(
        conn: &mut SqliteConnection,
        owners: &[OwnerRef],
    ) -> Result<ExistingFileIndex> {
        let mut index = ExistingFileIndex::new();

        for kind in [OwnerKind::Product, OwnerKind::Category, OwnerKind::Customer] {
            let ids: Vec<i64> = owners
                .iter()
                .filter(|o| o.kind == kind)
                .map(|o| o.id)
                .collect();

            let (table, column, order) = match single_ref_table(kind) {
                Some((table, column)) => (table, column, "0"),
                None => ("product_media_files", "product_id", "pm.display_order"),
            };

            for chunk in ids.chunks(MAX_OWNERS_PER_QUERY) {
                let mut query_builder: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(format!(
                    "SELECT pm.{column} AS owner_id, f.id AS media_file_id, f.name, f.size_bytes, \
                     f.sha256, {order} AS display_order \
                     FROM {table} pm JOIN media_files f ON f.id = pm.media_file_id \
                     WHERE pm.{column} IN ("
                ));
                let mut separated = query_builder.separated(", ");
                for id in chunk {
                    separated.push_bind(*id);
                }
                separated.push_unseparated(")");

                let rows = query_builder
                    .build_query_as::<ExistingRow>()
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::from_sqlx(
                            "Failed to load existing files",
                            e,
                        ))
                    })?;

                for row in rows {
                    let owner = OwnerRef { kind, id: row.owner_id };
                    index.record(owner, row.into());
                }
            }
        }

        tracing::debug!(
            owners = index.owner_count(),
            files = index.file_count(),
            "Loaded existing media files"
        );
        Ok(index)
    }
}

/// Attaches imported files to products as ordered images
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductImages;

#[async_trait]
impl MediaAssociation<SqliteConnection> for ProductImages {
    async fn add_media_file(
        &self,
        scope: &mut SqliteConnection,
        owner: &OwnerRef,
        file: &StoredFile,
        display_order: i32,
    ) -> Result<ExistingFile> {
        if owner.kind != OwnerKind::Product {
            return Err(Error::Association(format!("{} is not a product", owner)));
        }
        MediaStore::link_product_file(scope, owner.id, file.id, display_order).await?;
        Ok(descriptor(file, display_order))
    }
}

/// Assigns imported files as category images
#[derive(Clone)]
pub struct CategoryImages<'a> {
    store: &'a MediaStore,
}

/// Assigns imported files as customer avatars
#[derive(Clone)]
pub struct CustomerAvatars<'a> {
    store: &'a MediaStore,
}

impl<'a> CategoryImages<'a> {
    /// Association backed by `store`
    pub fn new(store: &'a MediaStore) -> Self {
        Self { store }
    }
}

impl<'a> CustomerAvatars<'a> {
    /// Association backed by `store`
    pub fn new(store: &'a MediaStore) -> Self {
        Self { store }
    }
}

async fn assign_single(
    scope: &mut SqliteConnection,
    expected: OwnerKind,
    owner: &OwnerRef,
    file: &StoredFile,
) -> Result<ExistingFile> {
    if owner.kind != expected {
        return Err(Error::Association(format!("{} is not a {}", owner, expected)));
    }
    MediaStore::assign_file(scope, owner, file.id).await?;
    Ok(descriptor(file, 0))
}

/// Whether `candidate` has the same content as the owner's current file
async fn same_as_assigned(
    store: &MediaStore,
    scope: &mut SqliteConnection,
    owner: &OwnerRef,
    candidate: &Path,
) -> Result<bool> {
    let Some(current) = store.assigned_file(scope, owner).await? else {
        return Ok(false);
    };
    let size = tokio::fs::metadata(candidate).await?.len();
    if size != current.size {
        return Ok(false);
    }
    Ok(sha256_file(candidate).await? == current.sha256)
}

#[async_trait]
impl MediaAssociation<SqliteConnection> for CategoryImages<'_> {
    async fn add_media_file(
        &self,
        scope: &mut SqliteConnection,
        owner: &OwnerRef,
        file: &StoredFile,
        _display_order: i32,
    ) -> Result<ExistingFile> {
        assign_single(scope, OwnerKind::Category, owner, file).await
    }

    async fn check_assigned_file(
        &self,
        scope: &mut SqliteConnection,
        owner: &OwnerRef,
        candidate: &Path,
    ) -> Result<bool> {
        same_as_assigned(self.store, scope, owner, candidate).await
    }
}

#[async_trait]
impl MediaAssociation<SqliteConnection> for CustomerAvatars<'_> {
    async fn add_media_file(
        &self,
        scope: &mut SqliteConnection,
        owner: &OwnerRef,
        file: &StoredFile,
        _display_order: i32,
    ) -> Result<ExistingFile> {
        assign_single(scope, OwnerKind::Customer, owner, file).await
    }

    async fn check_assigned_file(
        &self,
        scope: &mut SqliteConnection,
        owner: &OwnerRef,
        candidate: &Path,
    ) -> Result<bool> {
        same_as_assigned(self.store, scope, owner, candidate).await
    }
}
