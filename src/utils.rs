//! Utility functions for file names and content hashing

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Maximum number of disambiguation attempts when resolving name collisions
pub(crate) const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Characters that never make it into a stored file name
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Reduce a raw name to a safe file name
///
/// Path separators, reserved characters and control characters become `-`,
/// surrounding whitespace and dots are trimmed. Returns an empty string when
/// nothing usable is left.
///
/// # Examples
///
/// ```
/// use media_import::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("red shoe?.jpg"), "red shoe-.jpg");
/// assert_eq!(sanitize_file_name("  ..  "), "");
/// ```
pub fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_control() || FORBIDDEN.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect();
    cleaned.trim().trim_matches('.').trim().to_string()
}

/// Split a file name into stem and extension (without the dot)
fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Build the `n`-th disambiguated variant of `name`: `stem (n).ext`
pub fn disambiguate(name: &str, n: u32) -> String {
    match split_name(name) {
        (stem, Some(ext)) => format!("{} ({}).{}", stem, n, ext),
        (stem, None) => format!("{} ({})", stem, n),
    }
}

/// Strip a trailing ` (n)` disambiguator from the stem
///
/// ```
/// use media_import::utils::base_file_name;
///
/// assert_eq!(base_file_name("shoe (3).jpg"), "shoe.jpg");
/// assert_eq!(base_file_name("shoe.jpg"), "shoe.jpg");
/// assert_eq!(base_file_name("(2).jpg"), "(2).jpg");
/// ```
pub fn base_file_name(name: &str) -> String {
    let (stem, ext) = split_name(name);
    let base = stem
        .strip_suffix(')')
        .and_then(|s| s.rsplit_once(" ("))
        .filter(|(head, digits)| {
            !head.is_empty() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        })
        .map(|(head, _)| head)
        .unwrap_or(stem);
    match ext {
        Some(ext) => format!("{}.{}", base, ext),
        None => base.to_string(),
    }
}

/// Find the first name not rejected by `is_taken`
///
/// Returns `name` itself when free, otherwise `stem (2).ext`, `stem (3).ext`, …
/// Returns `None` if every candidate up to the attempt limit is taken.
pub fn unique_file_name(name: &str, mut is_taken: impl FnMut(&str) -> bool) -> Option<String> {
    if !is_taken(name) {
        return Some(name.to_string());
    }
    (2..=MAX_RENAME_ATTEMPTS)
        .map(|n| disambiguate(name, n))
        .find(|candidate| !is_taken(candidate))
}

/// Derive a file name from the last path segment of a URL
///
/// Percent-encoding is decoded and the result sanitized. Returns `None` when
/// the URL has no usable last segment.
pub fn file_name_from_url(url: &url::Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let name = sanitize_file_name(&decoded);
    (!name.is_empty()).then_some(name)
}

/// Hex SHA-256 of a file, streamed in 64 KiB chunks
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = tokio::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(to_hex(&hasher.finalize()))
}

/// Hex SHA-256 of an in-memory buffer
pub fn sha256_bytes(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

fn to_hex(digest: &[u8]) -> String {
    use std::fmt::Write;
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}
