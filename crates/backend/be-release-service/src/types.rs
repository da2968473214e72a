//! Data types and structures for the release service

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Logical name of the Squirrel.Windows release list carried in [`Snapshot::files`]
pub const RELEASES_FILE: &str = "RELEASES";

/// Latest known release, shared read-only between requests
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub version: String,
    pub notes: Option<String>,
    pub pub_date: DateTime<Utc>,
    /// Absence of a key means no build was shipped for that platform
    pub platforms: BTreeMap<Platform, PlatformAsset>,
    pub files: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn asset(&self, platform: Platform) -> Option<&PlatformAsset> {
        self.platforms.get(&platform)
    }

    pub fn release_list(&self) -> Option<&str> {
        self.files.get(RELEASES_FILE).map(String::as_str)
    }
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformAsset {
    pub name: String,
    /// Public download URL
    pub url: String,
    /// Upstream API URL, only fetched when proxying private downloads
    pub api_url: String,
    pub content_type: String,
    /// Size in megabytes, rounded to one decimal
    pub size: f64,
}

/// Update payload returned to auto-updaters
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct UpdateResponse {
    pub name: String,
    pub notes: Option<String>,
    pub pub_date: String,
    pub url: String,
}

/// Query string accepted by the download endpoints
#[derive(Deserialize, Debug, Default)]
pub struct DownloadQuery {
    pub update: Option<String>,
}

impl DownloadQuery {
    /// Any non-empty `?update=` value marks an update request, `false` included.
    pub fn is_update(&self) -> bool {
        self.update.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// Path parameters for the platform download endpoint
#[derive(Deserialize, Debug)]
pub struct PlatformParams {
    pub platform: String,
}

/// Path parameters for the update endpoint
#[derive(Deserialize, Debug)]
pub struct UpdateParams {
    pub platform: String,
    pub version: String,
}
