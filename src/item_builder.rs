//! Turns raw URL-or-path references into [`DownloadItem`]s
//!
//! Names are made unique against the batch's [`FileNameLookup`] up front, so
//! concurrent download workers always write to distinct staging files.

use crate::types::{DownloadItem, FileNameLookup, ItemSource, OwnerRef};
use crate::utils::{file_name_from_url, sanitize_file_name, unique_file_name};
use std::path::{Path, PathBuf};

/// Create a download item for `url_or_path`
///
/// - An absolute URL becomes a remote item staged into `download_dir`; its
///   file name comes from the last path segment.
/// - Anything else is a local path, resolved against `image_dir` when
///   relative. The file must exist.
///
/// The chosen name is disambiguated (`name (2).ext`, …) against `file_names`
/// and claimed there. Returns `None` for empty references, missing local files
/// and names that cannot be made unique.
pub fn create_download_item<S>(
    image_dir: &Path,
    download_dir: &Path,
    owner: OwnerRef,
    url_or_path: &str,
    payload: S,
    display_order: i32,
    file_names: &mut FileNameLookup,
) -> Option<DownloadItem<S>> {
    let reference = url_or_path.trim();
    if reference.is_empty() {
        return None;
    }

    let (source, proposed) = match classify(reference) {
        Reference::Remote(url) => {
            let name = file_name_from_url(&url)
                .unwrap_or_else(|| format!("{}-{}-{}", owner.kind, owner.id, display_order));
            (
                ItemSource::RemoteUrl {
                    url,
                    download_dir: download_dir.to_path_buf(),
                    staged: None,
                },
                name,
            )
        }
        Reference::Local(path) => {
            let path = if path.is_relative() {
                image_dir.join(path)
            } else {
                path
            };
            if !path.is_file() {
                tracing::debug!(path = %path.display(), owner = %owner, "Local image not found");
                return None;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(sanitize_file_name)
                .filter(|n| !n.is_empty())?;
            (ItemSource::LocalPath(path), name)
        }
    };

    let Some(name) = unique_file_name(&proposed, |n| file_names.contains(n)) else {
        tracing::warn!(name = %proposed, owner = %owner, "No free file name left in batch");
        return None;
    };
    file_names.insert(&name);

    Some(DownloadItem::new(source, name, owner, display_order, payload))
}

enum Reference {
    Remote(url::Url),
    Local(PathBuf),
}

fn classify(reference: &str) -> Reference {
    match url::Url::parse(reference) {
        Ok(url) if url.scheme() == "file" => match url.to_file_path() {
            Ok(path) => Reference::Local(path),
            Err(()) => Reference::Local(PathBuf::from(reference)),
        },
        // Single-letter schemes are Windows drive letters, not URLs
        Ok(url) if url.scheme().len() > 1 => Reference::Remote(url),
        _ => Reference::Local(PathBuf::from(reference)),
    }
}
