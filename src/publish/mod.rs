//! Release publishing.
//!
//! Creates a GitHub release tagged by the commit identifier and uploads the
//! packed archive as its sole asset. The tag is a deterministic function of
//! the commit, so a second run on the same commit fails on the collision;
//! there is no dedup or overwrite policy.

use std::path::Path;

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::PublishError;

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_UPLOADS_BASE: &str = "https://uploads.github.com";
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The release tag for a commit. Deterministic: the same commit always maps
/// to the same tag.
pub fn release_tag(commit_sha: &str) -> String {
    format!("pix3d_renders_{commit_sha}")
}

/// Configuration for the release publisher.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Repository in `owner/name` form.
    pub repo: String,
    /// API token supplied by the host environment.
    pub token: String,
    /// Commit identifier keying the release tag.
    pub commit_sha: String,
}

#[derive(Debug, Serialize)]
struct CreateReleaseRequest {
    tag_name: String,
    name: String,
    body: String,
    draft: bool,
    prerelease: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedRelease {
    id: u64,
    html_url: String,
}

/// A successfully published release.
#[derive(Debug)]
pub struct PublishedRelease {
    pub tag: String,
    pub url: String,
    pub asset_name: String,
    pub sha256: String,
}

/// GitHub release publisher.
pub struct ReleasePublisher {
    client: Client,
    config: PublishConfig,
}

impl ReleasePublisher {
    pub fn new(config: PublishConfig) -> Self {
        let client = Client::builder()
            .user_agent(format!("viewforge/{CURRENT_VERSION}"))
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("Failed to build HTTP client");
        Self { client, config }
    }

    /// Validate the publisher configuration.
    pub fn validate(&self) -> Result<(), PublishError> {
        if self.config.token.is_empty() {
            return Err(PublishError::MissingToken);
        }
        let sha = &self.config.commit_sha;
        if sha.len() < 7 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PublishError::InvalidCommit(sha.clone()));
        }
        Ok(())
    }

    /// Create the release and upload the archive as its sole asset.
    pub async fn publish(&self, archive_path: &Path) -> Result<PublishedRelease, PublishError> {
        self.validate()?;

        let bytes = std::fs::read(archive_path)?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let tag = release_tag(&self.config.commit_sha);
        let asset_name = format!("{tag}.tar");

        let body = format!(
            "Automated Pix3D render pipeline artifacts for commit {}.\n\n\
             asset sha256: {}\npublished: {}",
            self.config.commit_sha,
            sha256,
            Utc::now().to_rfc3339()
        );

        let release = self.create_release(&tag, &body).await?;
        self.upload_asset(release.id, &asset_name, bytes).await?;

        info!(tag, url = %release.html_url, "release published");
        Ok(PublishedRelease {
            tag,
            url: release.html_url,
            asset_name,
            sha256,
        })
    }

    async fn create_release(&self, tag: &str, body: &str) -> Result<CreatedRelease, PublishError> {
        let url = format!("{GITHUB_API_BASE}/repos/{}/releases", self.config.repo);
        let request = CreateReleaseRequest {
            tag_name: tag.to_string(),
            name: tag.to_string(),
            body: body.to_string(),
            draft: false,
            prerelease: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .header("Accept", "application/vnd.github.v3+json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let created: CreatedRelease = response.json().await?;
            info!(tag, repo = %self.config.repo, "release created");
            Ok(created)
        } else if status.as_u16() == 422 {
            // An existing tag/name collides; re-runs on the same commit are
            // expected to fail here.
            Err(PublishError::ReleaseExists(tag.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(PublishError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn upload_asset(
        &self,
        release_id: u64,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), PublishError> {
        let url = format!(
            "{GITHUB_UPLOADS_BASE}/repos/{}/releases/{}/assets?name={}",
            self.config.repo,
            release_id,
            urlencoding::encode(name)
        );

        let size = bytes.len();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.token)
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(name, bytes = size, "asset uploaded");
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(PublishError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Browser URL of the release this publisher would create.
    pub fn release_url(&self) -> String {
        format!(
            "https://github.com/{}/releases/tag/{}",
            self.config.repo,
            release_tag(&self.config.commit_sha)
        )
    }
}
