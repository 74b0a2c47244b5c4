//! Commit stage: store resolved items and attach them to their owners
//!
//! All writes go through the caller's transactional scope. A per-item failure
//! (write error, rejected association) marks that item `CommitFailed` and is
//! reported; an error for which [`Error::is_fatal`] holds is returned and ends
//! the batch.

use crate::duplicates::Resolution;
use crate::error::{Error, Result, StorageError};
use crate::reporting::Reporter;
use crate::storage::{Album, MediaAssociation, MediaStorage, StoredFile};
use crate::types::{DownloadItem, ExistingFile, ExistingFileIndex, ImportMessageKind, ItemState};
use crate::utils::{MAX_RENAME_ATTEMPTS, disambiguate};

/// Writes resolved items into a [`MediaStorage`] and associates them
pub struct CommitEngine<'a, St: MediaStorage> {
    storage: &'a St,
    association: &'a dyn MediaAssociation<St::Scope>,
    reporter: &'a Reporter,
}

enum Stored {
    Committed(ExistingFile),
    AlreadyAssigned,
}

impl<'a, St: MediaStorage> CommitEngine<'a, St> {
    /// Create an engine for one batch
    pub fn new(
        storage: &'a St,
        association: &'a dyn MediaAssociation<St::Scope>,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            storage,
            association,
            reporter,
        }
    }

    /// Commit one item according to its resolution
    ///
    /// Committed items are left alone, so calling this again for the same
    /// item changes nothing. Skipped items are reported here. Returns `Err`
    /// only for fatal errors.
    pub async fn commit<S>(
        &self,
        scope: &mut St::Scope,
        item: &mut DownloadItem<S>,
        resolution: Resolution,
        album: &Album,
        index: &mut ExistingFileIndex,
    ) -> Result<()> {
        if item.state == ItemState::Committed {
            tracing::debug!(owner = %item.owner, file = %item.target_file_name, "Already committed");
            return Ok(());
        }

        if let Resolution::Skip { existing } = &resolution {
            let reason = format!("matches existing file '{}' (id {})", existing.name, existing.file_id);
            self.reporter
                .report(ImportMessageKind::DuplicateSkipped, item, Some(reason));
            return Ok(());
        }

        if item.state != ItemState::Resolved {
            return Ok(());
        }

        match self.store(scope, item, &resolution, album).await {
            Ok(Stored::Committed(file)) => {
                tracing::debug!(
                    owner = %item.owner,
                    file = %file.name,
                    file_id = file.file_id,
                    display_order = item.display_order,
                    "Committed media file"
                );
                item.target_file_name = file.name.clone();
                item.stored_file_id = Some(file.file_id);
                item.state = ItemState::Committed;
                index.record(item.owner, file);
                Ok(())
            }
            Ok(Stored::AlreadyAssigned) => {
                item.state = ItemState::Skipped;
                self.reporter.report(
                    ImportMessageKind::DuplicateSkipped,
                    item,
                    Some("already assigned to owner".to_string()),
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(
                    owner = %item.owner,
                    file = %item.target_file_name,
                    error = %e,
                    "Storage backend unavailable, aborting batch"
                );
                Err(e)
            }
            Err(e) => {
                let reason = e.to_string();
                item.fail(ItemState::CommitFailed, reason.clone());
                self.reporter
                    .report(ImportMessageKind::CommitFailed, item, Some(reason));
                Ok(())
            }
        }
    }

    async fn store<S>(
        &self,
        scope: &mut St::Scope,
        item: &DownloadItem<S>,
        resolution: &Resolution,
        album: &Album,
    ) -> Result<Stored> {
        let source = item
            .file_path()
            .ok_or_else(|| Error::Other(format!("no local file for {}", item.source)))?;

        if let Resolution::Overwrite { existing } = resolution {
            let stored = self
                .storage
                .replace_file(scope, existing.file_id, source)
                .await?;
            return Ok(Stored::Committed(descriptor(&stored, existing.display_order)));
        }

        if self
            .association
            .check_assigned_file(scope, &item.owner, source)
            .await?
        {
            return Ok(Stored::AlreadyAssigned);
        }

        let name = self
            .free_album_name(scope, album, &item.target_file_name)
            .await?;
        let stored = self
            .storage
            .create_file(scope, album, &name, source)
            .await?;
        match self
            .association
            .add_media_file(scope, &item.owner, &stored, item.display_order)
            .await
        {
            Ok(file) => Ok(Stored::Committed(file)),
            Err(e) => {
                // An unattached file would hold its name in the album forever
                if let Err(cleanup) = self.storage.delete_file(scope, stored.id).await {
                    if cleanup.is_fatal() {
                        return Err(cleanup);
                    }
                    tracing::warn!(
                        file_id = stored.id,
                        error = %cleanup,
                        "Could not remove unattached media file"
                    );
                }
                Err(e)
            }
        }
    }

    /// First name not used by any file in the album, owned by anyone
    async fn free_album_name(
        &self,
        scope: &mut St::Scope,
        album: &Album,
        name: &str,
    ) -> Result<String> {
        if self.storage.find_file(scope, album, name).await?.is_none() {
            return Ok(name.to_string());
        }
        for n in 2..=MAX_RENAME_ATTEMPTS {
            let candidate = disambiguate(name, n);
            if self
                .storage
                .find_file(scope, album, &candidate)
                .await?
                .is_none()
            {
                tracing::debug!(album = %album.path, from = name, to = %candidate, "Renamed against album");
                return Ok(candidate);
            }
        }
        Err(StorageError::NameExhausted {
            name: name.to_string(),
            album: album.path.clone(),
        }
        .into())
    }
}

/// Index entry for a stored file
pub(crate) fn descriptor(stored: &StoredFile, display_order: i32) -> ExistingFile {
    ExistingFile {
        file_id: stored.id,
        name: stored.name.clone(),
        size: stored.size,
        sha256: Some(stored.sha256.clone()),
        display_order,
    }
}
