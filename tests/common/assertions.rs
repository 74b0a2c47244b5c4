//! Custom test assertions for integration tests

use media_import::{ImportMessage, MediaStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Everything currently buffered on a message receiver
pub fn drain_messages(rx: &mut broadcast::Receiver<ImportMessage>) -> Vec<ImportMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Every blob under the storage root with its content
pub fn storage_snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let content = std::fs::read(entry.path()).unwrap();
            (entry.path().to_path_buf(), content)
        })
        .collect()
}

/// File names linked to a product, in display order
pub async fn product_image_names(store: &MediaStore, product_id: i64) -> Vec<String> {
    let mut conn = store.pool().acquire().await.unwrap();
    MediaStore::product_files(&mut conn, product_id)
        .await
        .unwrap()
        .into_iter()
        .map(|file| file.name)
        .collect()
}

/// Number of media file records
pub async fn media_file_count(store: &MediaStore) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM media_files")
        .fetch_one(store.pool())
        .await
        .unwrap()
}
