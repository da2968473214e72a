//! Release snapshot providers
//!
//! Handlers only ever see a complete [`Snapshot`] behind an `Arc`. The GitHub
//! backed cache rebuilds a fresh snapshot on refresh and swaps it in whole.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::ReleaseConfig,
    error::ReleaseServiceError,
    github::{GitHubClient, Release, latest_release},
    platform::Platform,
    types::{PlatformAsset, RELEASES_FILE, Snapshot},
};

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Current snapshot. May wait on an in-flight refresh.
    async fn load_snapshot(&self) -> Result<Arc<Snapshot>, ReleaseServiceError>;
}

/// A provider that always hands out the same snapshot
pub struct FixedSnapshot(Option<Arc<Snapshot>>);

impl FixedSnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self(Some(Arc::new(snapshot)))
    }

    pub fn empty() -> Self {
        Self(None)
    }
}

#[async_trait]
impl SnapshotProvider for FixedSnapshot {
    async fn load_snapshot(&self) -> Result<Arc<Snapshot>, ReleaseServiceError> {
        self.0
            .clone()
            .ok_or_else(|| ReleaseServiceError::SnapshotUnavailable("no release loaded".into()))
    }
}

/// Classify a release asset by its file name.
///
/// Zipped mac builds are the update feed, the other installers are keyed by
/// extension. Names mentioning `arm64` or `aarch64` get the arm64 key.
pub fn platform_for_asset(file_name: &str) -> Option<Platform> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let lower = file_name.to_ascii_lowercase();

    let base = match extension {
        "zip" if lower.contains("mac") || lower.contains("darwin") => Platform::Darwin,
        "exe" => Platform::Exe,
        "dmg" => Platform::Dmg,
        "rpm" => Platform::Rpm,
        "deb" => Platform::Deb,
        "AppImage" => Platform::AppImage,
        _ => return None,
    };

    if lower.contains("arm64") || lower.contains("aarch64") {
        Some(base.with_arm64())
    } else {
        Some(base)
    }
}

/// Point the package names inside a Squirrel `RELEASES` file at the release's
/// download location, so clients fetch packages from the release host.
pub fn rewrite_release_list(content: &str, release_list_url: &str) -> String {
    let base = release_list_url
        .rsplit_once('/')
        .map(|(base, _)| base)
        .unwrap_or(release_list_url);

    content
        .lines()
        .map(|line| {
            line.split(' ')
                .map(|field| {
                    let is_package = field.to_ascii_lowercase().ends_with(".nupkg");
                    if is_package && !field.contains("://") {
                        format!("{base}/{field}")
                    } else {
                        field.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn size_in_megabytes(bytes: u64) -> f64 {
    (bytes as f64 / 1_000_000.0 * 10.0).round() / 10.0
}

/// Build a snapshot from a release, without the text files.
pub fn snapshot_from_release(release: &Release) -> Snapshot {
    let mut platforms = BTreeMap::new();

    for asset in &release.assets {
        let Some(platform) = platform_for_asset(&asset.name) else {
            debug!("Ignoring asset {}", asset.name);
            continue;
        };

        if platforms.contains_key(&platform) {
            warn!(
                "Asset {} replaces an earlier asset for {}",
                asset.name, platform
            );
        }

        platforms.insert(
            platform,
            PlatformAsset {
                name: asset.name.clone(),
                url: asset.browser_download_url.clone(),
                api_url: asset.url.clone(),
                content_type: asset.content_type.clone(),
                size: size_in_megabytes(asset.size),
            },
        );
    }

    Snapshot {
        version: release
            .tag_name
            .strip_prefix('v')
            .unwrap_or(&release.tag_name)
            .to_string(),
        notes: release.body.clone().filter(|b| !b.is_empty()),
        pub_date: release.published_at.unwrap_or_else(Utc::now),
        platforms,
        files: BTreeMap::new(),
    }
}

/// Pause between attempts while no snapshot could be built yet
const COLD_RETRY_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<Snapshot>>,
    last_update: Option<Instant>,
    last_failure: Option<Instant>,
}

impl CacheState {
    fn is_outdated(&self, interval: Duration) -> bool {
        let fresh = self
            .last_update
            .is_some_and(|last| last.elapsed() < interval);
        let backing_off = self
            .last_failure
            .is_some_and(|failed| failed.elapsed() < COLD_RETRY_BACKOFF.min(interval));
        !fresh && !backing_off
    }
}

/// Snapshot of the latest GitHub release, refreshed at most once per interval
pub struct GitHubReleaseCache {
    client: GitHubClient,
    interval: Duration,
    include_prereleases: bool,
    // Held across the refresh so concurrent loads wait for the same fetch.
    state: Mutex<CacheState>,
}

impl GitHubReleaseCache {
    pub fn new(config: &ReleaseConfig) -> Result<Self> {
        let client = GitHubClient::new(config.releases_api_url(), config.token.clone())?;
        Ok(Self::with_client(
            client,
            config.interval,
            config.include_prereleases,
        ))
    }

    pub fn with_client(client: GitHubClient, interval: Duration, include_prereleases: bool) -> Self {
        Self {
            client,
            interval,
            include_prereleases,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Keep the cache warm in the background.
    pub fn spawn_refresh(self: Arc<Self>) -> JoinHandle<()> {
        let mut ticker = tokio::time::interval(self.interval);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                if let Err(e) = self.load_snapshot().await {
                    warn!("Background release refresh produced no snapshot: {}", e);
                }
            }
        })
    }

    /// Fetch the latest release. `None` means the cached version is still current.
    #[instrument(skip_all)]
    async fn refresh(&self, current: Option<&Snapshot>) -> Result<Option<Snapshot>> {
        let releases = self.client.fetch_releases().await?;
        let release = latest_release(&releases, self.include_prereleases)
            .context("No published release found")?;

        let mut snapshot = snapshot_from_release(release);
        let release_list = release.assets.iter().find(|a| a.name == RELEASES_FILE);
        let complete = |c: &Snapshot| {
            c.version == snapshot.version
                && (release_list.is_none() || c.files.contains_key(RELEASES_FILE))
        };
        if current.is_some_and(complete) {
            debug!("Release {} is already cached", snapshot.version);
            return Ok(None);
        }

        if let Some(asset) = release_list {
            match self.client.fetch_text_asset(asset).await {
                Ok(content) => {
                    let content = rewrite_release_list(&content, &asset.browser_download_url);
                    snapshot.files.insert(RELEASES_FILE.to_string(), content);
                }
                Err(e) => error!("Failed to cache {}: {:#}", RELEASES_FILE, e),
            }
        }

        info!(
            "Cached release {} with {} platforms",
            snapshot.version,
            snapshot.platforms.len()
        );
        Ok(Some(snapshot))
    }
}

#[async_trait]
impl SnapshotProvider for GitHubReleaseCache {
    async fn load_snapshot(&self) -> Result<Arc<Snapshot>, ReleaseServiceError> {
        let mut state = self.state.lock().await;

        if state.is_outdated(self.interval) {
            match self.refresh(state.snapshot.as_deref()).await {
                Ok(Some(snapshot)) => {
                    state.snapshot = Some(Arc::new(snapshot));
                    state.last_update = Some(Instant::now());
                    state.last_failure = None;
                }
                Ok(None) => {
                    state.last_update = Some(Instant::now());
                    state.last_failure = None;
                }
                Err(e) => {
                    error!("Failed to refresh release cache: {:#}", e);
                    // A stale snapshot is served until the next interval.
                    if state.snapshot.is_some() {
                        state.last_update = Some(Instant::now());
                    }
                    state.last_failure = Some(Instant::now());
                }
            }
        }

        state.snapshot.clone().ok_or_else(|| {
            ReleaseServiceError::SnapshotUnavailable("no release has been cached yet".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
        routing::get,
    };

    use super::*;
    use crate::github::ReleaseAsset;

    fn asset(name: &str, size: u64) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            url: format!("https://api.github.com/repos/acme/app/releases/assets/{name}"),
            browser_download_url: format!(
                "https://github.com/acme/app/releases/download/v2.0.0/{name}"
            ),
            content_type: "application/octet-stream".into(),
            size,
        }
    }

    #[test]
    fn test_platform_for_asset() {
        let cases = [
            ("App-2.0.0-mac.zip", Some(Platform::Darwin)),
            ("App-2.0.0-darwin-arm64.zip", Some(Platform::DarwinArm64)),
            ("App-2.0.0.dmg", Some(Platform::Dmg)),
            ("App-2.0.0-arm64.dmg", Some(Platform::DmgArm64)),
            ("App Setup 2.0.0.exe", Some(Platform::Exe)),
            ("app_2.0.0_amd64.deb", Some(Platform::Deb)),
            ("app-2.0.0.aarch64.rpm", Some(Platform::RpmArm64)),
            ("App-2.0.0.AppImage", Some(Platform::AppImage)),
            ("App-2.0.0.appimage", None),
            ("App-2.0.0-win.zip", None),
            ("RELEASES", None),
            ("app-2.0.0-full.nupkg", None),
            ("latest-mac.yml", None),
        ];

        for (name, expected) in cases {
            assert_eq!(platform_for_asset(name), expected, "{name}");
        }
    }

    #[test]
    fn test_snapshot_from_release() {
        let release = Release {
            tag_name: "v2.0.0".into(),
            body: Some("Fixes".into()),
            draft: false,
            prerelease: false,
            published_at: None,
            assets: vec![
                asset("App-2.0.0-mac.zip", 91_234_567),
                asset("App-2.0.0.dmg", 88_211_456),
                asset("RELEASES", 120),
            ],
        };

        let snapshot = snapshot_from_release(&release);
        assert_eq!(snapshot.version, "2.0.0");
        assert_eq!(snapshot.notes.as_deref(), Some("Fixes"));
        assert_eq!(snapshot.platforms.len(), 2);

        let dmg = snapshot.asset(Platform::Dmg).unwrap();
        assert_eq!(dmg.size, 88.2);
        assert!(dmg.api_url.starts_with("https://api.github.com/"));
        assert!(snapshot.asset(Platform::Exe).is_none());
    }

    #[test]
    fn test_rewrite_release_list() {
        let content = "E3F67244E4166A65310C816221A12685C83F8E6F app-2.0.0-full.nupkg 600725\n\
                       0000000000000000000000000000000000000000 https://cdn.example.net/app-1.9.0-full.nupkg 500000";
        let rewritten = rewrite_release_list(
            content,
            "https://github.com/acme/app/releases/download/v2.0.0/RELEASES",
        );

        let lines: Vec<&str> = rewritten.lines().collect();
        assert_eq!(
            lines[0],
            "E3F67244E4166A65310C816221A12685C83F8E6F https://github.com/acme/app/releases/download/v2.0.0/app-2.0.0-full.nupkg 600725"
        );
        assert!(lines[1].contains(" https://cdn.example.net/app-1.9.0-full.nupkg "));
    }

    #[tokio::test]
    async fn test_fixed_snapshot_empty_is_unavailable() {
        let err = FixedSnapshot::empty().load_snapshot().await.unwrap_err();
        assert!(matches!(err, ReleaseServiceError::SnapshotUnavailable(_)));
    }

    /// Local stand-in for the GitHub API and its download host
    #[derive(Default)]
    struct FakeGitHub {
        release_hits: AtomicUsize,
        release_list_hits: AtomicUsize,
        /// Answer `/releases` with 502 after a short delay
        releases_down: bool,
        /// Number of leading `/download/RELEASES` calls that answer 503
        release_list_failures: usize,
    }

    async fn fake_github(fake: Arc<FakeGitHub>) -> String {
        async fn releases(State(fake): State<Arc<FakeGitHub>>, headers: HeaderMap) -> Response {
            fake.release_hits.fetch_add(1, Ordering::SeqCst);
            if fake.releases_down {
                tokio::time::sleep(Duration::from_millis(100)).await;
                return StatusCode::BAD_GATEWAY.into_response();
            }

            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(serde_json::json!([{
                "tag_name": "v2.0.0",
                "body": "Fixes",
                "draft": false,
                "prerelease": false,
                "published_at": "2024-05-01T10:00:00Z",
                "assets": [
                    {
                        "name": "App-2.0.0.dmg",
                        "url": format!("http://{host}/api/assets/1"),
                        "browser_download_url": format!("http://{host}/download/App-2.0.0.dmg"),
                        "content_type": "application/x-apple-diskimage",
                        "size": 1_500_000
                    },
                    {
                        "name": "RELEASES",
                        "url": format!("http://{host}/api/assets/2"),
                        "browser_download_url": format!("http://{host}/download/RELEASES"),
                        "content_type": "application/octet-stream",
                        "size": 80
                    }
                ]
            }]))
            .into_response()
        }

        async fn release_list(State(fake): State<Arc<FakeGitHub>>) -> Response {
            let attempt = fake.release_list_hits.fetch_add(1, Ordering::SeqCst);
            if attempt < fake.release_list_failures {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            "ABCDEF app-2.0.0-full.nupkg 600725".into_response()
        }

        let router = Router::new()
            .route("/releases", get(releases))
            .route("/download/RELEASES", get(release_list))
            .with_state(fake);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/releases")
    }

    async fn cache_for(fake: Arc<FakeGitHub>, interval: Duration) -> GitHubReleaseCache {
        let releases_url = fake_github(fake).await;
        let client = GitHubClient::new(releases_url, None).unwrap();
        GitHubReleaseCache::with_client(client, interval, false)
    }

    #[tokio::test]
    async fn test_github_cache_loads_and_reuses_snapshot() {
        let fake = Arc::new(FakeGitHub::default());
        let cache = cache_for(fake.clone(), Duration::from_secs(3600)).await;

        let first = cache.load_snapshot().await.unwrap();
        assert_eq!(first.version, "2.0.0");
        assert_eq!(first.asset(Platform::Dmg).unwrap().size, 1.5);
        assert!(
            first
                .release_list()
                .unwrap()
                .contains("/download/app-2.0.0-full.nupkg")
        );

        let second = cache.load_snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fake.release_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_github_cache_unavailable_without_upstream() {
        let client = GitHubClient::new("http://127.0.0.1:9/releases".into(), None).unwrap();
        let cache = GitHubReleaseCache::with_client(client, Duration::from_secs(3600), false);

        let err = cache.load_snapshot().await.unwrap_err();
        assert!(matches!(err, ReleaseServiceError::SnapshotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cold_failure_is_shared_by_waiting_loads() {
        let fake = Arc::new(FakeGitHub {
            releases_down: true,
            ..Default::default()
        });
        let cache = Arc::new(cache_for(fake.clone(), Duration::from_secs(3600)).await);

        let loads = (0..5).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.load_snapshot().await })
        });
        for load in loads.collect::<Vec<_>>() {
            let err = load.await.unwrap().unwrap_err();
            assert!(matches!(err, ReleaseServiceError::SnapshotUnavailable(_)));
        }

        assert_eq!(fake.release_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cold_failure_retries_after_backoff() {
        let fake = Arc::new(FakeGitHub {
            releases_down: true,
            ..Default::default()
        });
        let cache = cache_for(fake.clone(), Duration::from_millis(20)).await;

        assert!(cache.load_snapshot().await.is_err());
        assert!(cache.load_snapshot().await.is_err());
        assert_eq!(fake.release_hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.load_snapshot().await.is_err());
        assert_eq!(fake.release_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_release_list_is_fetched_again() {
        let fake = Arc::new(FakeGitHub {
            release_list_failures: 1,
            ..Default::default()
        });
        let cache = cache_for(fake.clone(), Duration::from_millis(10)).await;

        let first = cache.load_snapshot().await.unwrap();
        assert_eq!(first.version, "2.0.0");
        assert!(first.release_list().is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = cache.load_snapshot().await.unwrap();
        assert!(second.release_list().is_some());
        assert_eq!(fake.release_list_hits.load(Ordering::SeqCst), 2);

        // Complete snapshots are kept as they are.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let third = cache.load_snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(fake.release_list_hits.load(Ordering::SeqCst), 2);
    }
}
