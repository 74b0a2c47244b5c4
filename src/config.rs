//! Configuration types for media-import

use crate::types::DuplicateFileHandling;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (worker pool, timeouts)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum number of remote files fetched at the same time (default: 8)
    ///
    /// The limit is shared by every batch running on the same importer, so
    /// concurrent product and avatar imports never exceed it together.
    #[serde(default = "default_max_parallel_downloads")]
    pub max_parallel_downloads: usize,

    /// Timeout for a single fetch attempt (default: 30 seconds)
    #[serde(default = "default_per_item_timeout", with = "duration_serde")]
    pub per_item_timeout: Duration,

    /// User-Agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_parallel_downloads: default_max_parallel_downloads(),
            per_item_timeout: default_per_item_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient download failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base: delay before the first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Duplicate detection configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DuplicateConfig {
    /// What to do when an incoming file matches an existing one (default: rename)
    #[serde(default)]
    pub handling: DuplicateFileHandling,

    /// Compare file contents (SHA-256) instead of name and size (default: false)
    #[serde(default)]
    pub check_existing_file: bool,

    /// Files larger than this are never hashed; name and size are compared
    /// instead (default: 16 MiB)
    #[serde(default = "default_max_hash_size")]
    pub max_hash_size: u64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            handling: DuplicateFileHandling::default(),
            check_existing_file: false,
            max_hash_size: default_max_hash_size(),
        }
    }
}

/// Album paths used by the convenience entry points
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlbumConfig {
    /// Album for product images (default: "catalog")
    #[serde(default = "default_catalog_album")]
    pub product: String,

    /// Album for category images (default: "catalog")
    #[serde(default = "default_catalog_album")]
    pub category: String,

    /// Album for customer avatars (default: "customers")
    #[serde(default = "default_customer_album")]
    pub customer: String,
}

impl Default for AlbumConfig {
    fn default() -> Self {
        Self {
            product: default_catalog_album(),
            category: default_catalog_album(),
            customer: default_customer_album(),
        }
    }
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./media-import.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root directory for stored file blobs (default: "./media")
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            storage_root: default_storage_root(),
        }
    }
}

/// Main configuration for [`MediaImporter`](crate::MediaImporter)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory that relative local references are resolved against (default: "./images")
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Staging directory for fetched remote files (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Worker pool and timeout settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry and backoff policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Duplicate handling defaults
    #[serde(default)]
    pub duplicates: DuplicateConfig,

    /// Albums used by the product, category and avatar entry points
    #[serde(default)]
    pub albums: AlbumConfig,

    /// Database and blob storage locations
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Capacity of the reporting broadcast channel (default: 1024)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            download_dir: default_download_dir(),
            download: DownloadConfig::default(),
            retry: RetryConfig::default(),
            duplicates: DuplicateConfig::default(),
            albums: AlbumConfig::default(),
            persistence: PersistenceConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.download.max_parallel_downloads == 0 {
            return Err(crate::Error::Config {
                message: "max_parallel_downloads must be at least 1".to_string(),
                key: Some("download.max_parallel_downloads".to_string()),
            });
        }
        if self.download.per_item_timeout.is_zero() {
            return Err(crate::Error::Config {
                message: "per_item_timeout must be greater than zero".to_string(),
                key: Some("download.per_item_timeout".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(crate::Error::Config {
                message: "backoff_multiplier must be >= 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.event_capacity == 0 {
            return Err(crate::Error::Config {
                message: "event_capacity must be at least 1".to_string(),
                key: Some("event_capacity".to_string()),
            });
        }
        Ok(())
    }
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("./images")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./media-import.db")
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./media")
}

fn default_max_parallel_downloads() -> usize {
    8
}

fn default_per_item_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("media-import/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_hash_size() -> u64 {
    16 * 1024 * 1024
}

fn default_catalog_album() -> String {
    "catalog".to_string()
}

fn default_customer_album() -> String {
    "customers".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Backoff base is usually sub-second
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.download.max_parallel_downloads, 8);
        assert_eq!(config.download.per_item_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.duplicates.handling, DuplicateFileHandling::Rename);
        assert!(!config.duplicates.check_existing_file);
        assert_eq!(config.albums.product, "catalog");
        assert_eq!(config.albums.customer, "customers");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn policy_options_deserialize_from_json() {
        let json = r#"{
            "download": { "max_parallel_downloads": 4, "per_item_timeout": 5 },
            "retry": { "max_attempts": 1, "initial_delay": 250 },
            "duplicates": { "handling": "skip", "check_existing_file": true }
        }"#;

        let config: Config = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.download.max_parallel_downloads, 4);
        assert_eq!(config.download.per_item_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert!(config.retry.jitter, "unspecified fields keep their defaults");
        assert_eq!(config.duplicates.handling, DuplicateFileHandling::Skip);
        assert!(config.duplicates.check_existing_file);
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.download.max_parallel_downloads = 0;

        match config.validate() {
            Err(crate::Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("download.max_parallel_downloads"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }
}
