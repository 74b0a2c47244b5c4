use super::*;
use tempfile::TempDir;

mod albums;

/// Store backed by a scratch directory; keep the `TempDir` alive for the test
pub(super) async fn scratch_store() -> (TempDir, MediaStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = MediaStore::open(&dir.path().join("media.db"), &dir.path().join("media"))
        .await
        .unwrap();
    (dir, store)
}

/// Write a staged source file into the scratch directory
pub(super) fn staged(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("staging").join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, bytes).unwrap();
    path
}
