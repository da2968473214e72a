//! GitHub Releases API client

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tracing::{debug, instrument};

/// A GitHub release
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// A single file attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    /// API URL of the asset; needs the token for private repositories
    pub url: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
}

pub struct GitHubClient {
    http: reqwest::Client,
    releases_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(releases_url: String, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("be-release-service/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            http,
            releases_url,
            token,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    #[instrument(skip(self), fields(url = %self.releases_url))]
    pub async fn fetch_releases(&self) -> Result<Vec<Release>> {
        let response = self
            .authorized(self.http.get(&self.releases_url))
            .header(ACCEPT, "application/vnd.github.preview")
            .send()
            .await
            .context("Failed to fetch releases")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub API returned {}: {}", status, body);
        }

        let releases: Vec<Release> = response
            .json()
            .await
            .context("Failed to parse GitHub releases JSON")?;
        debug!("Fetched {} releases", releases.len());

        Ok(releases)
    }

    /// Download a small text asset. Private assets go through the API URL,
    /// which redirects to storage once authorized.
    #[instrument(skip(self, asset), fields(asset = %asset.name))]
    pub async fn fetch_text_asset(&self, asset: &ReleaseAsset) -> Result<String> {
        let request = match &self.token {
            Some(_) => self
                .authorized(self.http.get(&asset.url))
                .header(ACCEPT, "application/octet-stream"),
            None => self.http.get(&asset.browser_download_url),
        };

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to download {}", asset.name))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Download of {} returned {}", asset.name, status);
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read {}", asset.name))
    }
}

/// Newest release eligible for distribution. The API lists newest first.
pub fn latest_release(releases: &[Release], include_prereleases: bool) -> Option<&Release> {
    releases
        .iter()
        .find(|r| !r.draft && (include_prereleases || !r.prerelease))
}
