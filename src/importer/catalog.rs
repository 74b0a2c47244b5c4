//! Product, category and avatar entry points on the SQLite store.
//!
//! Each entry point checks that the batch only targets its owner kind, makes
//! sure the configured album exists, loads the owners' existing files and
//! runs the generic pipeline with the matching association.

use crate::db::{CategoryImages, CustomerAvatars, MediaStore, ProductImages};
use crate::error::{Error, Result};
use crate::storage::MediaAssociation;
use crate::types::{Batch, DuplicateFileHandling, ImportOutcome, OwnerKind};
use sqlx::SqliteConnection;

use super::MediaImporter;

impl MediaImporter<MediaStore> {
    /// Import product images; each product keeps an ordered list
    pub async fn import_product_images<S: Send + 'static>(
        &self,
        scope: &mut SqliteConnection,
        batch: Batch<S>,
        handling: DuplicateFileHandling,
    ) -> Result<ImportOutcome<S>> {
        let album = self.config.albums.product.clone();
        self.import_for(scope, batch, OwnerKind::Product, &album, &ProductImages, handling)
            .await
    }

    /// Import category images; a new image replaces the current one
    pub async fn import_category_images<S: Send + 'static>(
        &self,
        scope: &mut SqliteConnection,
        batch: Batch<S>,
        handling: DuplicateFileHandling,
    ) -> Result<ImportOutcome<S>> {
        let album = self.config.albums.category.clone();
        let association = CategoryImages::new(&self.storage);
        self.import_for(scope, batch, OwnerKind::Category, &album, &association, handling)
            .await
    }

    /// Import customer avatars; a new avatar replaces the current one
    pub async fn import_customer_avatars<S: Send + 'static>(
        &self,
        scope: &mut SqliteConnection,
        batch: Batch<S>,
        handling: DuplicateFileHandling,
    ) -> Result<ImportOutcome<S>> {
        let album = self.config.albums.customer.clone();
        let association = CustomerAvatars::new(&self.storage);
        self.import_for(scope, batch, OwnerKind::Customer, &album, &association, handling)
            .await
    }

    async fn import_for<S: Send + 'static>(
        &self,
        scope: &mut SqliteConnection,
        batch: Batch<S>,
        kind: OwnerKind,
        album_path: &str,
        association: &dyn MediaAssociation<SqliteConnection>,
        handling: DuplicateFileHandling,
    ) -> Result<ImportOutcome<S>> {
        if let Some(item) = batch.items().iter().find(|item| item.owner.kind != kind) {
            return Err(Error::InvalidBatch(format!(
                "{} references {} in a {} import",
                item.target_file_name, item.owner, kind
            )));
        }

        let album = self.storage.ensure_album(scope, album_path).await?;
        let mut existing = MediaStore::load_existing_files(scope, &batch.owners()).await?;
        let options = self.default_options().with_handling(handling);

        self.import_media_files(scope, batch, &mut existing, &album, association, options)
            .await
    }
}
