//! Single fetch attempt of one URL into a staging file.

use crate::error::{DownloadError, Error, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Fetch `url` into `dest`
///
/// Returns the number of bytes written. Only http and https are fetched;
/// anything else fails permanently.
pub(super) async fn fetch_to_file(
    client: &reqwest::Client,
    url: &url::Url,
    dest: &Path,
) -> Result<u64> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(DownloadError::UnsupportedScheme {
                url: url.to_string(),
                scheme: other.to_string(),
            }
            .into());
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        }
        .into());
    }

    fetch_once(client, url, dest).await
}

async fn fetch_once(client: &reqwest::Client, url: &url::Url, dest: &Path) -> Result<u64> {
    let mut response = client.get(url.clone()).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        }
        .into());
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let expected = response.content_length();
    let file = tokio::fs::File::create(dest).await?;
    let mut writer = tokio::io::BufWriter::new(file);
    let mut written = 0u64;

    while let Some(chunk) = response.chunk().await? {
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;

    if let Some(expected) = expected
        && expected != written
    {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "truncated body from {}: expected {} bytes, got {}",
                url, expected, written
            ),
        )));
    }

    Ok(written)
}
