//! # media-import
//!
//! Bulk import of catalog media: product images, category images and
//! customer avatars referenced by URL or local path.
//!
//! ## Pipeline
//!
//! - **Item builder** - turns a reference and its owner into a [`DownloadItem`]
//!   with a batch-unique file name
//! - **Download manager** - fetches remote items with bounded parallelism,
//!   per-attempt timeout and retry/backoff; local files pass through
//! - **Duplicate resolver** - compares each item with the owner's existing
//!   files and applies [`DuplicateFileHandling`]
//! - **Commit engine** - stores the file and associates it with its owner
//!   inside a transactional scope owned by the caller
//! - **Reporting** - download failures, skipped duplicates and failed commits
//!   are published as [`ImportMessage`]s
//!
//! Failures stay with the item that caused them. Only a storage backend that
//! becomes unusable aborts a batch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_import::{Batch, Config, DuplicateFileHandling, MediaImporter, OwnerRef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let importer = MediaImporter::open(Config::default()).await?;
//!
//!     // Subscribe to per-item reports
//!     let mut events = importer.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(message) = events.recv().await {
//!             println!("{:?}: {}", message.kind, message.file_name);
//!         }
//!     });
//!
//!     let mut batch = Batch::new();
//!     importer.add_to_batch(
//!         &mut batch,
//!         OwnerRef::product(42),
//!         "https://cdn.example.com/img/red-shoe.jpg",
//!         (),
//!         0,
//!     );
//!
//!     let mut tx = importer.storage().begin().await?;
//!     let outcome = importer
//!         .import_product_images(&mut tx, batch, DuplicateFileHandling::Rename)
//!         .await?;
//!     tx.commit().await?;
//!
//!     println!("{} new images", outcome.new_files);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Commit stage
pub mod commit;
/// Configuration types
pub mod config;
/// SQLite media store
pub mod db;
/// Concurrent downloads
pub mod download;
/// Duplicate resolution
pub mod duplicates;
/// Error types
pub mod error;
/// Batch import entry points
pub mod importer;
/// Download item construction
pub mod item_builder;
/// Reporting sink
pub mod reporting;
/// Retry logic with exponential backoff
pub mod retry;
/// Storage and association traits
pub mod storage;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use commit::CommitEngine;
pub use config::{AlbumConfig, Config, DownloadConfig, DuplicateConfig, PersistenceConfig, RetryConfig};
pub use db::{CategoryImages, CustomerAvatars, MediaStore, ProductImages, ProductMediaFile};
pub use download::DownloadManager;
pub use duplicates::{Equivalence, ResolveOptions, Resolution};
pub use error::{DatabaseError, DownloadError, Error, Result, StorageError};
pub use importer::{ImportOptions, MediaImporter};
pub use item_builder::create_download_item;
pub use reporting::{MessageHandler, Reporter};
pub use storage::{Album, MediaAssociation, MediaStorage, StoredFile};
pub use types::{
    Batch, DownloadItem, DuplicateFileHandling, ExistingFile, ExistingFileIndex, FileNameLookup,
    ImportMessage, ImportMessageKind, ImportOutcome, ItemSource, ItemState, OwnerKind, OwnerRef,
};
