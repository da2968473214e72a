//! Request orchestration over the snapshot, resolver, negotiator and dispatcher

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::{
    analytics,
    cache::SnapshotProvider,
    config::ReleaseConfig,
    dispatch::{Dispatcher, DownloadRedirect},
    error::ReleaseServiceError,
    overview::{OverviewDetails, OverviewRenderer},
    platform::{ClientSignals, Platform},
    types::{Snapshot, UpdateResponse},
    version::{UpdateDecision, is_valid_version, negotiate},
};

/// Shared state handed to every handler
pub struct AppState {
    pub config: ReleaseConfig,
    snapshots: Arc<dyn SnapshotProvider>,
    dispatcher: Dispatcher,
    renderer: Arc<dyn OverviewRenderer>,
}

impl AppState {
    pub fn new(
        config: ReleaseConfig,
        snapshots: Arc<dyn SnapshotProvider>,
        renderer: Arc<dyn OverviewRenderer>,
    ) -> Result<Self, ReleaseServiceError> {
        let dispatcher = Dispatcher::new(config.token.clone())?;
        Ok(Self {
            config,
            snapshots,
            dispatcher,
            renderer,
        })
    }

    /// Download for whatever platform the user agent points at
    #[instrument(skip(self))]
    pub async fn latest_download(
        &self,
        user_agent: Option<&str>,
        is_update: bool,
    ) -> Result<DownloadRedirect, ReleaseServiceError> {
        let result = async {
            let platform = ClientSignals::from_user_agent(user_agent, is_update)
                .resolve()
                .ok_or(ReleaseServiceError::PlatformUndetected)?;
            self.dispatch_platform(platform, is_update).await
        }
        .await;

        if let Err(e) = &result {
            analytics::track_download_failed(None, is_update, e.code());
        }
        result
    }

    /// Download for a platform named in the URL
    #[instrument(skip(self))]
    pub async fn platform_download(
        &self,
        token: &str,
        is_update: bool,
    ) -> Result<DownloadRedirect, ReleaseServiceError> {
        let result = async {
            let platform = ClientSignals::from_platform(token, is_update)
                .resolve()
                .ok_or_else(|| ReleaseServiceError::InvalidPlatform(token.to_string()))?;
            self.dispatch_platform(platform, is_update).await
        }
        .await;

        if let Err(e) = &result {
            analytics::track_download_failed(Some(token), is_update, e.code());
        }
        result
    }

    async fn dispatch_platform(
        &self,
        platform: Platform,
        is_update: bool,
    ) -> Result<DownloadRedirect, ReleaseServiceError> {
        let snapshot = self.snapshots.load_snapshot().await?;
        let asset = snapshot
            .asset(platform)
            .ok_or(ReleaseServiceError::AssetNotFound(platform))?;

        debug!("Dispatching {} ({})", platform, asset.name);
        let redirect = self.dispatcher.dispatch(asset).await?;
        analytics::track_download_redirect(
            platform.as_str(),
            is_update,
            self.dispatcher.proxy_mode(),
        );
        Ok(redirect)
    }

    /// Update check for an auto-updater.
    ///
    /// `Ok(None)` covers both "no build for this platform" and "already on the
    /// latest version"; the endpoint does not tell them apart.
    #[instrument(skip(self))]
    pub async fn check_for_update(
        &self,
        platform_token: &str,
        current_version: &str,
    ) -> Result<Option<UpdateResponse>, ReleaseServiceError> {
        let result = self.negotiate_update(platform_token, current_version).await;

        match &result {
            Ok(update) => analytics::track_update_check(
                platform_token,
                current_version,
                update.is_some(),
                update.as_ref().map(|u| u.name.as_str()),
            ),
            Err(e) => {
                analytics::track_update_check_failed(platform_token, current_version, e.code())
            }
        }
        result
    }

    async fn negotiate_update(
        &self,
        platform_token: &str,
        current_version: &str,
    ) -> Result<Option<UpdateResponse>, ReleaseServiceError> {
        if !is_valid_version(current_version) {
            return Err(ReleaseServiceError::InvalidVersion(
                current_version.to_string(),
            ));
        }

        let platform = ClientSignals::from_platform(platform_token, true)
            .resolve()
            .ok_or_else(|| ReleaseServiceError::InvalidPlatform(platform_token.to_string()))?;

        let snapshot = self.snapshots.load_snapshot().await?;
        let Some(asset) = snapshot.asset(platform) else {
            debug!("No asset for {}, nothing to offer", platform);
            return Ok(None);
        };

        match negotiate(&snapshot.version, current_version)? {
            UpdateDecision::UpToDate => {
                debug!("Client is on {}", snapshot.version);
                Ok(None)
            }
            UpdateDecision::UpdateAvailable => {
                let url = if self.dispatcher.proxy_mode() {
                    self.second_hop_url(platform_token)
                } else {
                    asset.url.clone()
                };
                Ok(Some(update_response(&snapshot, url)))
            }
        }
    }

    /// In proxy mode updaters are sent back through the download endpoint so
    /// they never see an upstream URL.
    fn second_hop_url(&self, platform_token: &str) -> String {
        let base = self.config.public_url.as_deref().unwrap_or_default();
        format!("{base}/download/{platform_token}?update=true")
    }

    /// Raw `RELEASES` file of the latest release
    #[instrument(skip(self))]
    pub async fn release_list(&self) -> Result<String, ReleaseServiceError> {
        let snapshot = self.snapshots.load_snapshot().await.map_err(|e| {
            debug!("Release list requested without a snapshot: {}", e);
            ReleaseServiceError::ReleaseListMissing
        })?;

        snapshot
            .release_list()
            .map(str::to_string)
            .ok_or(ReleaseServiceError::ReleaseListMissing)
    }

    #[instrument(skip(self))]
    pub async fn overview(&self) -> Result<String, ReleaseServiceError> {
        let snapshot = self.snapshots.load_snapshot().await?;
        let details = OverviewDetails::new(&self.config, &snapshot, Utc::now());
        self.renderer.render(&details)
    }
}

fn update_response(snapshot: &Snapshot, url: String) -> UpdateResponse {
    UpdateResponse {
        name: snapshot.version.clone(),
        notes: snapshot.notes.clone(),
        pub_date: snapshot.pub_date.to_rfc3339(),
        url,
    }
}
