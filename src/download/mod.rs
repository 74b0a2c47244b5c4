//! Concurrent download of remote items with bounded parallelism.
//!
//! [`DownloadManager::download`] fans a batch out over a worker window of
//! `max_parallel_downloads` and streams every item back as soon as it is done,
//! so resolution and commit can run while later items are still in flight.
//! The same semaphore is shared by every clone of the manager, which caps the
//! total number of open fetches across concurrently running batches.
//!
//! - local items pass through as `Downloaded`
//! - remote items are fetched with per-attempt timeout and retry/backoff
//! - a failure marks only that item `DownloadFailed` and is reported once
//! - cancellation leaves unstarted and aborted items `Pending`, unreported
//! - fetched files land in a staging directory private to the item's batch

mod fetch;
mod staging;

pub(crate) use staging::{discard_staged, remove_staging_dir, staging_dirs};

use crate::config::{DownloadConfig, RetryConfig};
use crate::error::{DownloadError, Result};
use crate::reporting::Reporter;
use crate::retry::fetch_with_retry;
use crate::types::{DownloadItem, ImportMessageKind, ItemSource, ItemState};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// Fetches remote items into their staging directory
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    config: Arc<DownloadConfig>,
    retry: Arc<RetryConfig>,
    limit: Arc<Semaphore>,
    reporter: Reporter,
}

enum Target {
    Local(PathBuf),
    Remote { url: url::Url, dest: PathBuf },
}

impl DownloadManager {
    /// Create a manager with its own HTTP client and worker limit
    pub fn new(config: &DownloadConfig, retry: &RetryConfig, reporter: Reporter) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.per_item_timeout)
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config.clone()),
            retry: Arc::new(retry.clone()),
            limit: Arc::new(Semaphore::new(config.max_parallel_downloads.max(1))),
            reporter,
        })
    }

    /// Download every item of a batch
    ///
    /// Items come back on the returned channel in completion order. Dropping
    /// the receiver aborts whatever is still in flight.
    pub fn download<S: Send + 'static>(
        &self,
        items: Vec<DownloadItem<S>>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<DownloadItem<S>> {
        let workers = self.config.max_parallel_downloads.max(1);
        let (tx, rx) = mpsc::channel(workers);
        let manager = self.clone();

        tokio::spawn(async move {
            let mut results = futures::stream::iter(items)
                .map(|item| manager.process(item, cancel.clone()))
                .buffer_unordered(workers);

            while let Some(item) = results.next().await {
                if tx.send(item).await.is_err() {
                    tracing::debug!("Download receiver dropped, abandoning batch");
                    break;
                }
            }
        });

        rx
    }

    async fn process<S>(&self, mut item: DownloadItem<S>, cancel: CancellationToken) -> DownloadItem<S> {
        // Items from a re-submitted batch keep whatever progress they made
        if cancel.is_cancelled() || item.state != ItemState::Pending {
            return item;
        }

        let target = match &item.source {
            ItemSource::LocalPath(path) => Target::Local(path.clone()),
            ItemSource::RemoteUrl {
                url, download_dir, ..
            } => Target::Remote {
                url: url.clone(),
                dest: staging::staging_path(&item, download_dir),
            },
        };

        match target {
            Target::Local(path) => self.pass_through(item, &path).await,
            Target::Remote { url, dest } => self.fetch_remote(item, url, dest, cancel).await,
        }
    }

    async fn pass_through<S>(&self, mut item: DownloadItem<S>, path: &Path) -> DownloadItem<S> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {
                item.size = Some(meta.len());
                item.state = ItemState::Downloaded;
            }
            other => {
                let reason = match other {
                    Ok(_) => "not a regular file".to_string(),
                    Err(e) => e.to_string(),
                };
                let err = DownloadError::LocalFileUnavailable {
                    path: path.to_path_buf(),
                    reason,
                };
                self.fail(&mut item, err.to_string());
            }
        }
        item
    }

    async fn fetch_remote<S>(
        &self,
        mut item: DownloadItem<S>,
        url: url::Url,
        dest: PathBuf,
        cancel: CancellationToken,
    ) -> DownloadItem<S> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return item,
            permit = self.limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return item,
            },
        };

        item.state = ItemState::Downloading;
        tracing::debug!(url = %url, file = %dest.display(), owner = %item.owner, "Downloading");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = fetch_with_retry(&self.retry, &url, self.config.per_item_timeout, || {
                fetch::fetch_to_file(&self.client, &url, &dest)
            }) => Some(result),
        };
        drop(permit);

        match outcome {
            None => {
                staging::remove_file(&dest).await;
                item.state = ItemState::Pending;
                tracing::debug!(url = %url, "Download cancelled");
            }
            Some(Ok(size)) => {
                if let ItemSource::RemoteUrl { staged, .. } = &mut item.source {
                    *staged = Some(dest);
                }
                item.size = Some(size);
                item.state = ItemState::Downloaded;
                tracing::debug!(url = %url, bytes = size, "Downloaded");
            }
            Some(Err(e)) => {
                staging::remove_file(&dest).await;
                self.fail(&mut item, e.to_string());
            }
        }
        item
    }

    fn fail<S>(&self, item: &mut DownloadItem<S>, reason: String) {
        item.fail(ItemState::DownloadFailed, reason.clone());
        self.reporter
            .report(ImportMessageKind::DownloadFailed, item, Some(reason));
    }
}
