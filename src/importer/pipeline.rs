//! Batch import against any content store.

use crate::commit::CommitEngine;
use crate::download::{discard_staged, remove_staging_dir, staging_dirs};
use crate::duplicates::{self, ResolveOptions};
use crate::error::Result;
use crate::storage::{Album, MediaAssociation, MediaStorage};
use crate::types::{Batch, ExistingFileIndex, ImportOutcome, ItemState};

use super::{ImportOptions, MediaImporter};

impl<St: MediaStorage> MediaImporter<St> {
    /// Import a batch into `album`, attaching files through `association`
    ///
    /// Downloads run in parallel; each finished item is resolved against
    /// `existing_files` and committed inside `scope` as soon as it arrives.
    /// The scope belongs to the caller: nothing here begins, commits or rolls
    /// it back.
    ///
    /// Per-item failures end up in the item states and on the reporting
    /// channel. A fatal storage error stops the batch's downloads and is
    /// returned; work committed so far is in the scope and the caller decides
    /// whether to keep it. Cancelling the batch's token stops new downloads,
    /// aborts running ones, and returns what was committed until then.
    ///
    /// Fetched files are staged in a directory private to the batch and
    /// deleted as soon as their item is finished. Files of items still
    /// `Downloaded` after a cancellation are kept for the caller.
    pub async fn import_media_files<S: Send + 'static>(
        &self,
        scope: &mut St::Scope,
        batch: Batch<S>,
        existing_files: &mut ExistingFileIndex,
        album: &Album,
        association: &dyn MediaAssociation<St::Scope>,
        options: ImportOptions,
    ) -> Result<ImportOutcome<S>> {
        let Batch {
            id: batch_id,
            items,
            mut file_names,
            cancel,
        } = batch;
        let total = items.len();
        let staging = staging_dirs(&items);

        let resolve_options = ResolveOptions {
            handling: options.duplicate_handling,
            check_existing_file: options.check_existing_file,
            max_hash_size: self.config.duplicates.max_hash_size,
        };
        tracing::debug!(
            batch = %batch_id,
            items = total,
            album = %album.path,
            handling = ?resolve_options.handling,
            equivalence = ?resolve_options.equivalence(),
            "Starting media import"
        );

        // Returning early (fatal error) cancels this batch's downloads only
        let downloads_cancel = cancel.child_token();
        let _abort_downloads = downloads_cancel.clone().drop_guard();
        let mut finished = self.downloads.download(items, downloads_cancel.clone());

        let engine = CommitEngine::new(self.storage.as_ref(), association, &self.reporter);
        let mut items = Vec::with_capacity(total);
        let mut new_files = 0;

        while let Some(mut item) = finished.recv().await {
            // Already fetched items stay Downloaded once the batch is cancelled
            if !cancel.is_cancelled()
                && let Some(resolution) = duplicates::resolve(
                    &mut item,
                    existing_files,
                    &resolve_options,
                    &mut file_names,
                )
                .await
            {
                let committed = engine
                    .commit(scope, &mut item, resolution, album, existing_files)
                    .await;
                if let Err(e) = committed {
                    downloads_cancel.cancel();
                    drop(finished);
                    for dir in &staging {
                        remove_staging_dir(dir, true).await;
                    }
                    return Err(e);
                }
                if item.state == ItemState::Committed {
                    new_files += 1;
                }
            }
            if item.state.is_terminal() {
                discard_staged(&mut item).await;
            }
            items.push(item);
        }

        for dir in &staging {
            remove_staging_dir(dir, false).await;
        }

        items.sort_by_key(|item| item.position);
        let outcome = ImportOutcome { new_files, items };

        tracing::info!(
            batch = %batch_id,
            album = %album.path,
            items = total,
            new_files,
            skipped = outcome.count(ItemState::Skipped),
            download_failed = outcome.count(ItemState::DownloadFailed),
            commit_failed = outcome.count(ItemState::CommitFailed),
            not_started = outcome.count(ItemState::Pending),
            cancelled = cancel.is_cancelled(),
            "Media import finished"
        );

        Ok(outcome)
    }
}
