//! In-memory storage and association doubles for unit tests

use crate::commit::descriptor;
use crate::error::{DatabaseError, Error, Result, StorageError};
use crate::storage::{Album, MediaAssociation, MediaStorage, StoredFile};
use crate::types::{ExistingFile, OwnerRef};
use crate::utils::{sha256_bytes, sha256_file};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// Scope handed to [`MemoryStorage`]; counts writes made through it
#[derive(Debug, Default)]
pub(crate) struct MemoryScope {
    pub writes: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Failure {
    /// Blob writes fail, item-level
    Write,
    /// Backend gone, batch-level
    Backend,
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    files: Vec<StoredFile>,
    fail_with: Option<Failure>,
}

#[derive(Default)]
pub(crate) struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_with(&self, failure: Option<Failure>) {
        self.state.lock().unwrap().fail_with = failure;
    }

    pub(crate) fn files(&self) -> Vec<StoredFile> {
        self.state.lock().unwrap().files.clone()
    }

    /// Seed a file as if stored by an earlier import
    pub(crate) fn seed(&self, album: &Album, name: &str, bytes: &[u8]) -> StoredFile {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let file = StoredFile {
            id: state.next_id,
            album_id: album.id,
            name: name.to_string(),
            size: bytes.len() as u64,
            sha256: sha256_bytes(bytes),
            storage_path: format!("/memory/{}", name).into(),
        };
        state.files.push(file.clone());
        file
    }

    fn check(&self, path: &Path) -> Result<()> {
        match self.state.lock().unwrap().fail_with {
            Some(Failure::Write) => Err(StorageError::WriteFailed {
                path: path.to_path_buf(),
                reason: "disk full".to_string(),
            }
            .into()),
            Some(Failure::Backend) => Err(Error::Database(DatabaseError::ConnectionFailed(
                "connection reset".to_string(),
            ))),
            None => Ok(()),
        }
    }
}

pub(crate) fn album() -> Album {
    Album {
        id: 1,
        path: "catalog".to_string(),
    }
}

#[async_trait]
impl MediaStorage for MemoryStorage {
    type Scope = MemoryScope;

    async fn find_album(&self, _scope: &mut MemoryScope, path: &str) -> Result<Option<Album>> {
        Ok(Some(Album {
            id: 1,
            path: path.to_string(),
        }))
    }

    async fn find_file(
        &self,
        _scope: &mut MemoryScope,
        album: &Album,
        name: &str,
    ) -> Result<Option<StoredFile>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .find(|f| f.album_id == album.id && f.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn create_file(
        &self,
        scope: &mut MemoryScope,
        album: &Album,
        name: &str,
        source: &Path,
    ) -> Result<StoredFile> {
        self.check(source)?;
        let bytes = tokio::fs::read(source).await?;
        scope.writes += 1;
        Ok(self.seed(album, name, &bytes))
    }

    async fn replace_file(
        &self,
        scope: &mut MemoryScope,
        file_id: i64,
        source: &Path,
    ) -> Result<StoredFile> {
        self.check(source)?;
        let bytes = tokio::fs::read(source).await?;
        scope.writes += 1;
        let mut state = self.state.lock().unwrap();
        let file = state
            .files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or(StorageError::FileNotFound { id: file_id })?;
        file.size = bytes.len() as u64;
        file.sha256 = sha256_bytes(&bytes);
        Ok(file.clone())
    }

    async fn delete_file(&self, scope: &mut MemoryScope, file_id: i64) -> Result<()> {
        scope.writes += 1;
        self.state.lock().unwrap().files.retain(|f| f.id != file_id);
        Ok(())
    }
}

/// Association that records every join
#[derive(Default)]
pub(crate) struct RecordingAssociation {
    pub joins: Mutex<Vec<(OwnerRef, i64, i32)>>,
    pub assigned: Mutex<HashSet<String>>,
    pub reject: bool,
}

impl RecordingAssociation {
    pub(crate) fn joins(&self) -> Vec<(OwnerRef, i64, i32)> {
        self.joins.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaAssociation<MemoryScope> for RecordingAssociation {
    async fn add_media_file(
        &self,
        _scope: &mut MemoryScope,
        owner: &OwnerRef,
        file: &StoredFile,
        display_order: i32,
    ) -> Result<ExistingFile> {
        if self.reject {
            return Err(Error::Association(format!("{} is locked", owner)));
        }
        self.joins
            .lock()
            .unwrap()
            .push((*owner, file.id, display_order));
        Ok(descriptor(file, display_order))
    }

    async fn check_assigned_file(
        &self,
        _scope: &mut MemoryScope,
        _owner: &OwnerRef,
        candidate: &Path,
    ) -> Result<bool> {
        let hash = sha256_file(candidate).await?;
        Ok(self.assigned.lock().unwrap().contains(&hash))
    }
}
