//! Remote update source: a GitHub repository branch.
//!
//! ```text
//! GET {api_base}/repos/{owner}/{name}/commits/{branch}  ──► {"sha": "..."}   (version marker)
//! GET {api_base}/repos/{owner}/{name}/tarball/{sha}     ──► .tar.gz snapshot
//! ```

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, UpdateError};
use crate::marker::VersionMarker;

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

/// Fetches version markers and snapshots for one repository branch.
#[derive(Debug, Clone)]
pub struct GithubSource {
    http: reqwest::Client,
    api_base: Url,
    repository: String,
    branch: String,
}

impl GithubSource {
    /// Create a source for `repository` (`owner/name`) at `branch`.
    ///
    /// # Errors
    ///
    /// Returns `UpdateError::Client` if the HTTP client cannot be built.
    pub fn new(api_base: Url, repository: &str, branch: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cardgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpdateError::Client(e.to_string()))?;

        Ok(Self {
            http,
            api_base,
            repository: repository.to_string(),
            branch: branch.to_string(),
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{tail}",
            self.api_base.as_str().trim_end_matches('/'),
            self.repository
        )
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| UpdateError::request(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Fetch the marker of the branch head.
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses, or a response without a commit
    /// hash.
    pub async fn latest_marker(&self) -> Result<VersionMarker> {
        let url = self.url(&format!("commits/{}", self.branch));
        let commit: CommitResponse = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| UpdateError::InvalidResponse(e.to_string()))?;

        debug!(branch = %self.branch, sha = %commit.sha, "Fetched remote version");
        VersionMarker::new(&commit.sha)
            .ok_or_else(|| UpdateError::InvalidResponse("empty commit hash".to_string()))
    }

    /// Download the gzipped tar snapshot of `marker`.
    ///
    /// # Errors
    ///
    /// Transport failures or non-2xx statuses.
    pub async fn download_snapshot(&self, marker: &VersionMarker) -> Result<Vec<u8>> {
        let url = self.url(&format!("tarball/{marker}"));
        let bytes = self
            .get(&url)
            .await?
            .bytes()
            .await
            .map_err(|e| UpdateError::request(&url, &e))?;

        debug!(marker = %marker.short(), bytes = bytes.len(), "Downloaded snapshot");
        Ok(bytes.to_vec())
    }
}
