//! Test configuration helpers for creating importers on scratch directories

use media_import::config::RetryConfig;
use media_import::{Config, MediaImporter, MediaStore};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Importer on a temporary database, storage root and image directory
pub struct TestHarness {
    /// The importer under test
    pub importer: MediaImporter<MediaStore>,
    /// Directory holding local source images
    pub images: PathBuf,
    /// Keeps all scratch directories alive
    pub temp_dir: TempDir,
}

impl TestHarness {
    /// The SQLite store behind the importer
    pub fn store(&self) -> &MediaStore {
        self.importer.storage()
    }

    /// Write a local source image and return its reference
    pub fn local_image(&self, name: &str, bytes: &[u8]) -> String {
        let path = self.images.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        name.to_string()
    }
}

/// Create an importer with fast retries and default worker count
pub async fn create_test_importer() -> TestHarness {
    create_test_importer_with(|_| {}).await
}

/// Create an importer, letting the test adjust the configuration first
pub async fn create_test_importer_with(adjust: impl FnOnce(&mut Config)) -> TestHarness {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let images = root.join("images");
    std::fs::create_dir_all(&images).unwrap();

    let mut config = Config {
        image_dir: images.clone(),
        download_dir: root.join("downloads"),
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        ..Default::default()
    };
    config.download.per_item_timeout = Duration::from_secs(5);
    config.persistence.database_path = root.join("db").join("media.db");
    config.persistence.storage_root = root.join("media");
    adjust(&mut config);

    let importer = MediaImporter::open(config).await.unwrap();

    TestHarness {
        importer,
        images,
        temp_dir,
    }
}
