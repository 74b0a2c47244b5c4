//! Core types for media-import

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::item_builder;
use crate::utils::unique_file_name;

/// Kind of business entity a file is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    /// A catalog product (ordered list of images)
    Product,
    /// A catalog category (single image)
    Category,
    /// A customer (single avatar)
    Customer,
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerKind::Product => write!(f, "product"),
            OwnerKind::Category => write!(f, "category"),
            OwnerKind::Customer => write!(f, "customer"),
        }
    }
}

/// Reference to the entity a stored file will be attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerRef {
    /// Entity kind
    pub kind: OwnerKind,
    /// Entity id
    pub id: i64,
}

impl OwnerRef {
    /// Reference a product
    pub fn product(id: i64) -> Self {
        Self {
            kind: OwnerKind::Product,
            id,
        }
    }

    /// Reference a category
    pub fn category(id: i64) -> Self {
        Self {
            kind: OwnerKind::Category,
            id,
        }
    }

    /// Reference a customer
    pub fn customer(id: i64) -> Self {
        Self {
            kind: OwnerKind::Customer,
            id,
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Where the bytes of an item come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemSource {
    /// Absolute http(s) URL, fetched into `download_dir`
    RemoteUrl {
        /// The URL to fetch
        url: url::Url,
        /// Staging directory the file is written to
        download_dir: PathBuf,
        /// Local staged copy, set once the download succeeded
        staged: Option<PathBuf>,
    },
    /// Existing file, resolved against the image directory
    LocalPath(PathBuf),
}

impl ItemSource {
    /// Whether the item has to be fetched over the network
    pub fn is_remote(&self) -> bool {
        matches!(self, ItemSource::RemoteUrl { .. })
    }

    /// Local file holding the item's bytes, if it has been materialized
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            ItemSource::RemoteUrl { staged, .. } => staged.as_deref(),
            ItemSource::LocalPath(path) => Some(path),
        }
    }
}

impl std::fmt::Display for ItemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemSource::RemoteUrl { url, .. } => write!(f, "{}", url),
            ItemSource::LocalPath(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Lifecycle of a [`DownloadItem`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Built, not yet picked up by a download worker
    Pending,
    /// A worker is fetching the item
    Downloading,
    /// Bytes are available locally
    Downloaded,
    /// Fetch failed after retries (terminal)
    DownloadFailed,
    /// Passed duplicate resolution, ready to commit
    Resolved,
    /// Discarded as a duplicate (terminal)
    Skipped,
    /// Stored and associated (terminal)
    Committed,
    /// Storage write or association failed (terminal)
    CommitFailed,
}

impl ItemState {
    /// Whether no stage will touch the item again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::DownloadFailed
                | ItemState::Skipped
                | ItemState::Committed
                | ItemState::CommitFailed
        )
    }
}

/// One unit of work: a file to fetch, resolve and attach to an owner
///
/// `S` is caller-defined state carried through the pipeline untouched, e.g. the
/// import row an image came from.
#[derive(Clone, Debug)]
pub struct DownloadItem<S = ()> {
    pub(crate) source: ItemSource,
    pub(crate) target_file_name: String,
    pub(crate) owner: OwnerRef,
    pub(crate) display_order: i32,
    pub(crate) state: ItemState,
    pub(crate) size: Option<u64>,
    pub(crate) stored_file_id: Option<i64>,
    pub(crate) error: Option<String>,
    pub(crate) position: usize,
    pub(crate) batch: Option<Arc<str>>,
    /// Caller state
    pub payload: S,
}

impl<S> DownloadItem<S> {
    pub(crate) fn new(
        source: ItemSource,
        target_file_name: String,
        owner: OwnerRef,
        display_order: i32,
        payload: S,
    ) -> Self {
        Self {
            source,
            target_file_name,
            owner,
            display_order,
            state: ItemState::Pending,
            size: None,
            stored_file_id: None,
            error: None,
            position: 0,
            batch: None,
            payload,
        }
    }

    /// Where the bytes come from
    pub fn source(&self) -> &ItemSource {
        &self.source
    }

    /// File name the item will be stored under
    pub fn target_file_name(&self) -> &str {
        &self.target_file_name
    }

    /// Owning entity
    pub fn owner(&self) -> OwnerRef {
        self.owner
    }

    /// Position among the owner's files
    pub fn display_order(&self) -> i32 {
        self.display_order
    }

    /// Current lifecycle state
    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Size in bytes once materialized
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Id of the stored media file once committed
    pub fn stored_file_id(&self) -> Option<i64> {
        self.stored_file_id
    }

    /// Reason of the last failure
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Local file holding the bytes, if materialized
    pub fn file_path(&self) -> Option<&Path> {
        self.source.local_path()
    }

    /// Id of the batch the item was last queued on
    pub fn batch_id(&self) -> Option<&str> {
        self.batch.as_deref()
    }

    pub(crate) fn fail(&mut self, state: ItemState, reason: impl Into<String>) {
        self.state = state;
        self.error = Some(reason.into());
    }
}

/// How to treat an incoming file that matches an already stored one
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateFileHandling {
    /// Store under a disambiguated name and keep both (default)
    #[default]
    Rename,
    /// Discard the incoming file, keep the existing one
    Skip,
    /// Replace the existing file's bytes, keep its id and associations
    Overwrite,
}

/// Case-insensitive set of file names already claimed within a batch
#[derive(Clone, Debug, Default)]
pub struct FileNameLookup {
    names: HashSet<String>,
}

impl FileNameLookup {
    /// Create an empty lookup
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is already claimed
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_lowercase())
    }

    /// Claim `name`; returns false if it was already claimed
    pub fn insert(&mut self, name: &str) -> bool {
        self.names.insert(name.to_lowercase())
    }

    /// Number of claimed names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing has been claimed yet
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Descriptor of a file already attached to an owner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingFile {
    /// Stored media file id
    pub file_id: i64,
    /// Stored file name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256 of the content, when known
    pub sha256: Option<String>,
    /// Position among the owner's files
    pub display_order: i32,
}

/// Files already attached to each owner in a batch
///
/// Owned by one batch. The pipeline only appends to it, so later items in a
/// batch see files committed by earlier ones.
#[derive(Clone, Debug, Default)]
pub struct ExistingFileIndex {
    files: HashMap<OwnerRef, Vec<ExistingFile>>,
}

impl ExistingFileIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Files attached to `owner`
    pub fn files(&self, owner: &OwnerRef) -> &[ExistingFile] {
        self.files.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record a file for `owner`, replacing an entry with the same file id
    pub fn record(&mut self, owner: OwnerRef, file: ExistingFile) {
        let entries = self.files.entry(owner).or_default();
        match entries.iter_mut().find(|f| f.file_id == file.file_id) {
            Some(entry) => *entry = file,
            None => entries.push(file),
        }
    }

    /// Number of owners with at least one file
    pub fn owner_count(&self) -> usize {
        self.files.len()
    }

    /// Total number of recorded files
    pub fn file_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }
}

/// Items submitted together, sharing name uniqueness and cancellation
pub struct Batch<S = ()> {
    pub(crate) id: Arc<str>,
    pub(crate) items: Vec<DownloadItem<S>>,
    pub(crate) file_names: FileNameLookup,
    pub(crate) cancel: CancellationToken,
}

impl<S> Default for Batch<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Batch<S> {
    /// Create an empty batch with its own cancellation token
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Create an empty batch cancelled by `cancel`
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            id: Arc::from(format!("batch-{:016x}", rand::random::<u64>())),
            items: Vec::new(),
            file_names: FileNameLookup::new(),
            cancel,
        }
    }

    /// Build an item from a URL or path and queue it
    ///
    /// Returns false when no item could be built (empty reference, missing
    /// local file).
    pub fn add(
        &mut self,
        image_dir: &Path,
        download_dir: &Path,
        owner: OwnerRef,
        url_or_path: &str,
        payload: S,
        display_order: i32,
    ) -> bool {
        match item_builder::create_download_item(
            image_dir,
            download_dir,
            owner,
            url_or_path,
            payload,
            display_order,
            &mut self.file_names,
        ) {
            Some(item) => {
                self.enqueue(item);
                true
            }
            None => false,
        }
    }

    /// Queue an already built item
    ///
    /// A pending item whose name the batch already holds is renamed
    /// (`name (2).ext`, …) so no two items stage to the same file. Returns
    /// false, leaving the batch unchanged, when no free name is left.
    pub fn push(&mut self, mut item: DownloadItem<S>) -> bool {
        if item.state == ItemState::Pending && self.file_names.contains(&item.target_file_name) {
            let Some(name) =
                unique_file_name(&item.target_file_name, |n| self.file_names.contains(n))
            else {
                tracing::warn!(
                    name = %item.target_file_name,
                    owner = %item.owner,
                    "No free file name left in batch"
                );
                return false;
            };
            tracing::debug!(from = %item.target_file_name, to = %name, "Renamed queued item");
            item.target_file_name = name;
        }
        self.file_names.insert(&item.target_file_name);
        self.enqueue(item);
        true
    }

    fn enqueue(&mut self, mut item: DownloadItem<S>) {
        item.position = self.items.len();
        item.batch = Some(Arc::clone(&self.id));
        self.items.push(item);
    }

    /// Identifier of this batch, also carried by its items and messages
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queued items in submission order
    pub fn items(&self) -> &[DownloadItem<S>] {
        &self.items
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Token that cancels this batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Names claimed so far, for building items outside [`Batch::add`]
    pub fn file_names_mut(&mut self) -> &mut FileNameLookup {
        &mut self.file_names
    }

    /// Distinct owners referenced by the batch
    pub fn owners(&self) -> Vec<OwnerRef> {
        let mut owners: Vec<OwnerRef> = self.items.iter().map(|i| i.owner).collect();
        owners.sort();
        owners.dedup();
        owners
    }
}

/// Result of one batch import
#[derive(Debug)]
pub struct ImportOutcome<S = ()> {
    /// Number of items committed by this invocation
    pub new_files: usize,
    /// All items in submission order, with their final states
    pub items: Vec<DownloadItem<S>>,
}

impl<S> ImportOutcome<S> {
    /// Number of items in `state`
    pub fn count(&self, state: ItemState) -> usize {
        self.items.iter().filter(|i| i.state == state).count()
    }
}

/// Kind of a reportable event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMessageKind {
    /// A download failed permanently or ran out of retries
    DownloadFailed,
    /// An item was discarded as a duplicate
    DuplicateSkipped,
    /// Storing or associating an item failed
    CommitFailed,
}

/// Reportable event about a single item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportMessage {
    /// What happened
    pub kind: ImportMessageKind,
    /// Owner of the item
    pub owner: OwnerRef,
    /// Target file name of the item
    pub file_name: String,
    /// URL or local path of the item
    pub source: String,
    /// Display order of the item
    pub display_order: i32,
    /// Failure reason or skip explanation
    pub reason: Option<String>,
    /// Batch the item belonged to
    pub batch_id: Option<String>,
}
