//! Duplicate resolution against the files an owner already has
//!
//! Two equivalence tests exist:
//! - [`Equivalence::NameAndSize`] (default): same file name, compared
//!   case-insensitively and ignoring ` (n)` disambiguators, and same length
//! - [`Equivalence::Content`]: same length and same SHA-256, regardless of
//!   name; used when `check_existing_file` is set and the file is no larger
//!   than `max_hash_size`
//!
//! Resolution never fails. If hashing is impossible the weaker test is used.

use crate::config::DuplicateConfig;
use crate::types::{
    DownloadItem, DuplicateFileHandling, ExistingFile, ExistingFileIndex, FileNameLookup,
    ItemState,
};
use crate::utils::{base_file_name, sha256_file, unique_file_name};

/// How incoming files are compared with existing ones
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Equivalence {
    /// Same name (case-insensitive) and same byte length
    NameAndSize,
    /// Same byte length and same content hash
    Content,
}

/// Options for one batch's resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Policy applied when a duplicate is found
    pub handling: DuplicateFileHandling,
    /// Compare contents instead of names
    pub check_existing_file: bool,
    /// Largest file that is hashed for content comparison
    pub max_hash_size: u64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from(&DuplicateConfig::default())
    }
}

impl From<&DuplicateConfig> for ResolveOptions {
    fn from(config: &DuplicateConfig) -> Self {
        Self {
            handling: config.handling,
            check_existing_file: config.check_existing_file,
            max_hash_size: config.max_hash_size,
        }
    }
}

impl ResolveOptions {
    /// Equivalence test configured for this batch
    pub fn equivalence(&self) -> Equivalence {
        if self.check_existing_file {
            Equivalence::Content
        } else {
            Equivalence::NameAndSize
        }
    }
}

/// Decision for one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No duplicate; store as a new file
    New,
    /// Duplicate found; stored as a new file under a new name
    Renamed {
        /// Name before disambiguation
        from: String,
    },
    /// Duplicate found; replace its bytes
    Overwrite {
        /// The file whose slot is reused
        existing: ExistingFile,
    },
    /// Duplicate found; item discarded
    Skip {
        /// The matching file
        existing: ExistingFile,
    },
}

/// Resolve a downloaded item against its owner's existing files
///
/// Returns `None` for items that are not `Downloaded`. Otherwise moves the
/// item to `Resolved` (or `Skipped`) and, for renames, rewrites its target
/// name and claims it in `file_names`.
pub async fn resolve<S>(
    item: &mut DownloadItem<S>,
    index: &ExistingFileIndex,
    options: &ResolveOptions,
    file_names: &mut FileNameLookup,
) -> Option<Resolution> {
    if item.state != ItemState::Downloaded {
        return None;
    }

    let existing = index.files(&item.owner);
    let duplicate = find_duplicate(item, existing, options).await.cloned();

    let Some(duplicate) = duplicate else {
        item.state = ItemState::Resolved;
        return Some(Resolution::New);
    };

    tracing::debug!(
        owner = %item.owner,
        file = %item.target_file_name,
        existing = %duplicate.name,
        existing_id = duplicate.file_id,
        handling = ?options.handling,
        "Duplicate found"
    );

    match options.handling {
        DuplicateFileHandling::Skip => {
            item.state = ItemState::Skipped;
            Some(Resolution::Skip {
                existing: duplicate,
            })
        }
        DuplicateFileHandling::Overwrite => {
            item.target_file_name = duplicate.name.clone();
            item.state = ItemState::Resolved;
            Some(Resolution::Overwrite {
                existing: duplicate,
            })
        }
        DuplicateFileHandling::Rename => {
            let from = item.target_file_name.clone();
            // The item's own claim on its name does not block keeping it
            let renamed = unique_file_name(&from, |candidate| {
                existing
                    .iter()
                    .any(|f| f.name.eq_ignore_ascii_case(candidate))
                    || (candidate != from && file_names.contains(candidate))
            });
            match renamed {
                Some(name) => {
                    file_names.insert(&name);
                    item.target_file_name = name;
                    item.state = ItemState::Resolved;
                    Some(Resolution::Renamed { from })
                }
                // Album-level renaming in the commit stage still keeps both
                None => {
                    item.state = ItemState::Resolved;
                    Some(Resolution::Renamed { from })
                }
            }
        }
    }
}

async fn find_duplicate<'a, S>(
    item: &DownloadItem<S>,
    existing: &'a [ExistingFile],
    options: &ResolveOptions,
) -> Option<&'a ExistingFile> {
    if existing.is_empty() {
        return None;
    }
    let size = item.size?;

    if options.equivalence() == Equivalence::Content && size <= options.max_hash_size {
        if let Some(hash) = content_hash(item).await {
            let by_content = existing.iter().find(|f| {
                f.size == size && f.sha256.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(&hash))
            });
            if by_content.is_some() {
                return by_content;
            }
            // Existing files without a recorded hash can still match by name
            return existing
                .iter()
                .filter(|f| f.sha256.is_none())
                .find(|f| same_name_and_size(f, &item.target_file_name, size));
        }
    }

    existing
        .iter()
        .find(|f| same_name_and_size(f, &item.target_file_name, size))
}

fn same_name_and_size(file: &ExistingFile, name: &str, size: u64) -> bool {
    file.size == size && base_file_name(&file.name).eq_ignore_ascii_case(&base_file_name(name))
}

async fn content_hash<S>(item: &DownloadItem<S>) -> Option<String> {
    let path = item.file_path()?;
    match sha256_file(path).await {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::warn!(
                file = %path.display(),
                error = %e,
                "Could not hash file, falling back to name and size"
            );
            None
        }
    }
}
