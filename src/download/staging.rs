//! Per-batch staging directories for fetched files.
//!
//! Every batch stages into `<download_dir>/<batch id>/`, so batches running at
//! the same time never share a staging file even when they fetch files with
//! the same name.

use crate::types::{DownloadItem, ItemSource};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// File a remote item is fetched into
pub(crate) fn staging_path<S>(item: &DownloadItem<S>, download_dir: &Path) -> PathBuf {
    match &item.batch {
        Some(batch) => download_dir.join(batch.as_ref()).join(&item.target_file_name),
        None => download_dir.join(&item.target_file_name),
    }
}

/// Staging directories the remote items of a batch will write into
pub(crate) fn staging_dirs<S>(items: &[DownloadItem<S>]) -> BTreeSet<PathBuf> {
    items
        .iter()
        .filter_map(|item| match (&item.source, &item.batch) {
            (ItemSource::RemoteUrl { download_dir, .. }, Some(batch)) => {
                Some(download_dir.join(batch.as_ref()))
            }
            _ => None,
        })
        .collect()
}

/// Delete the staged copy of a remote item; local sources are left alone
pub(crate) async fn discard_staged<S>(item: &mut DownloadItem<S>) {
    if let ItemSource::RemoteUrl { staged, .. } = &mut item.source
        && let Some(path) = staged.take()
    {
        remove_file(&path).await;
    }
}

/// Remove a batch staging directory
///
/// Without `force` only an empty directory is removed, so files of items left
/// `Downloaded` by a cancelled batch survive.
pub(crate) async fn remove_staging_dir(dir: &Path, force: bool) {
    let result = if force {
        tokio::fs::remove_dir_all(dir).await
    } else {
        tokio::fs::remove_dir(dir).await
    };
    match result {
        Ok(()) => tracing::debug!(dir = %dir.display(), "Removed staging directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(dir = %dir.display(), error = %e, "Kept staging directory"),
    }
}

pub(super) async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(file = %path.display(), "Removed staged file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(file = %path.display(), error = %e, "Could not remove staged file"),
    }
}
