//! Media importer: the entry point tying the pipeline stages together.
//!
//! The `MediaImporter` struct and its methods are organized by domain:
//! - [`pipeline`] - Generic batch import against any [`MediaStorage`]
//! - [`catalog`] - Product, category and avatar entry points on [`MediaStore`]

mod catalog;
mod pipeline;


use crate::config::{Config, DuplicateConfig};
use crate::db::MediaStore;
use crate::download::DownloadManager;
use crate::error::Result;
use crate::item_builder;
use crate::reporting::{MessageHandler, Reporter};
use crate::storage::MediaStorage;
use crate::types::{
    Batch, DownloadItem, DuplicateFileHandling, FileNameLookup, ImportMessage, OwnerRef,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Per-invocation duplicate policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportOptions {
    /// What to do with duplicates
    pub duplicate_handling: DuplicateFileHandling,
    /// Compare file contents instead of name and size
    pub check_existing_file: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&DuplicateConfig::default())
    }
}

impl From<&DuplicateConfig> for ImportOptions {
    fn from(config: &DuplicateConfig) -> Self {
        Self {
            duplicate_handling: config.handling,
            check_existing_file: config.check_existing_file,
        }
    }
}

impl ImportOptions {
    /// Same options with a different duplicate policy
    pub fn with_handling(self, duplicate_handling: DuplicateFileHandling) -> Self {
        Self {
            duplicate_handling,
            ..self
        }
    }
}

/// Bulk media importer (cloneable - all fields are Arc-wrapped)
///
/// Clones share the download worker limit and the reporting channel, so
/// batches running concurrently on clones never exceed
/// `max_parallel_downloads` open fetches in total.
pub struct MediaImporter<St: MediaStorage> {
    /// Content store the pipeline writes into
    pub(crate) storage: Arc<St>,
    /// Download worker pool
    pub(crate) downloads: DownloadManager,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Reporting sink
    pub(crate) reporter: Reporter,
}

impl<St: MediaStorage> Clone for MediaImporter<St> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            downloads: self.downloads.clone(),
            config: Arc::clone(&self.config),
            reporter: self.reporter.clone(),
        }
    }
}

impl<St: MediaStorage> MediaImporter<St> {
    /// Create an importer writing into `storage`
    pub fn new(config: Config, storage: Arc<St>) -> Result<Self> {
        config.validate()?;

        let reporter = Reporter::new(config.event_capacity);
        let downloads = DownloadManager::new(&config.download, &config.retry, reporter.clone())?;

        Ok(Self {
            storage,
            downloads,
            config: Arc::new(config),
            reporter,
        })
    }

    /// Subscribe to download failures, skipped duplicates and failed commits
    pub fn subscribe(&self) -> broadcast::Receiver<ImportMessage> {
        self.reporter.subscribe()
    }

    /// Install a callback invoked synchronously for every reported message
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&ImportMessage) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        self.reporter.set_handler(Some(handler));
    }

    /// Remove the message handler
    pub fn clear_message_handler(&self) {
        self.reporter.set_handler(None);
    }

    /// Importer configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The content store
    pub fn storage(&self) -> &St {
        &self.storage
    }

    /// Duplicate policy from the configuration
    pub fn default_options(&self) -> ImportOptions {
        ImportOptions::from(&self.config.duplicates)
    }

    /// Build an item with the configured image and download directories
    pub fn create_download_item<S>(
        &self,
        owner: OwnerRef,
        url_or_path: &str,
        payload: S,
        display_order: i32,
        file_names: &mut FileNameLookup,
    ) -> Option<DownloadItem<S>> {
        item_builder::create_download_item(
            &self.config.image_dir,
            &self.config.download_dir,
            owner,
            url_or_path,
            payload,
            display_order,
            file_names,
        )
    }

    /// Build an item with the configured directories and queue it on `batch`
    pub fn add_to_batch<S>(
        &self,
        batch: &mut Batch<S>,
        owner: OwnerRef,
        url_or_path: &str,
        payload: S,
        display_order: i32,
    ) -> bool {
        batch.add(
            &self.config.image_dir,
            &self.config.download_dir,
            owner,
            url_or_path,
            payload,
            display_order,
        )
    }
}

impl MediaImporter<MediaStore> {
    /// Open the configured SQLite store and create an importer on it
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let store = MediaStore::open(
            &config.persistence.database_path,
            &config.persistence.storage_root,
        )
        .await?;
        Self::new(config, Arc::new(store))
    }
}
