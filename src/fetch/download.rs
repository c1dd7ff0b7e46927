//! Streaming HTTP downloads for engine and dataset archives.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::FetchError;

use super::extract::{extract_archive, ArchiveKind};

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Derive the archive file name from a URL, dropping any query or fragment.
pub fn archive_name_from_url(url: &str) -> Result<String, FetchError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.is_empty() {
        return Err(FetchError::UnsupportedFormat(url.to_string()));
    }
    Ok(name.to_string())
}

/// HTTP downloader for archive dependencies.
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Create a downloader with a project user agent.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("viewforge/{CURRENT_VERSION}"))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }

    /// Download a URL to a file on disk, streaming the body.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if the request fails or the server responds with
    /// a non-success status. There is no retry.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        info!(url, dest = %dest.display(), "downloading");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::DownloadFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::DownloadFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(url, bytes = written, "download complete");
        Ok(written)
    }

    /// Download an archive and extract it into `dest_dir`.
    ///
    /// The archive kind is detected from the URL file name. The downloaded
    /// file is staged in a temporary directory and removed after extraction.
    /// `strip_components` drops that many leading path components from every
    /// archive entry (the engine distribution is extracted with 1, the
    /// dataset with 0).
    pub async fn fetch_archive(
        &self,
        url: &str,
        dest_dir: &Path,
        strip_components: usize,
    ) -> Result<usize, FetchError> {
        let name = archive_name_from_url(url)?;
        // Fail on unrecognized formats before spending bandwidth.
        ArchiveKind::from_name(&name)?;

        let staging = tempfile::tempdir()?;
        let archive_path = staging.path().join(&name);
        self.download(url, &archive_path).await?;

        std::fs::create_dir_all(dest_dir)?;
        debug!(archive = %archive_path.display(), dest = %dest_dir.display(), strip_components, "extracting");
        let files = extract_archive(&archive_path, dest_dir, strip_components)?;
        info!(dest = %dest_dir.display(), files, "extraction complete");
        Ok(files)
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_name_from_url() {
        assert_eq!(
            archive_name_from_url("http://pix3d.csail.mit.edu/data/pix3d.zip").unwrap(),
            "pix3d.zip"
        );
        assert_eq!(
            archive_name_from_url("https://example.org/engine.tar.gz?token=abc#frag").unwrap(),
            "engine.tar.gz"
        );
    }

    #[test]
    fn test_archive_name_rejects_bare_directory_url() {
        let result = archive_name_from_url("https://example.org/downloads/");
        assert!(result.is_err());
    }
}
