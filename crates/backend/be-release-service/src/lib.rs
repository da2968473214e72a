//! Release Distribution Service
//!
//! Serves downloads and update checks for a desktop application from a cached
//! snapshot of its latest GitHub release. Squirrel and Electron style updaters
//! query `/update/{platform}/{version}`; people land on `/download`.
//!
//! When a GitHub token is configured the release assets are treated as
//! private: downloads are resolved through the GitHub API with the token and
//! only the resulting redirect is handed to the client.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

pub mod aliases;
pub mod analytics;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod github;
pub mod handlers;
pub mod overview;
pub mod platform;
pub mod service;
pub mod types;
pub mod version;

use cache::GitHubReleaseCache;
use overview::HandlebarsOverview;
use service::AppState;

/// Create the axum router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::overview_handler))
        .route("/download", get(handlers::latest_download_handler))
        .route(
            "/download/{platform}",
            get(handlers::platform_download_handler),
        )
        .route("/update/{platform}/{version}", get(handlers::update_handler))
        // Squirrel.Windows fetches the release list next to the update URL
        .route(
            "/update/{platform}/{version}/RELEASES",
            get(handlers::release_list_handler),
        )
        .route("/RELEASES", get(handlers::release_list_handler))
        .route("/health", get(handlers::health_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Build the GitHub backed service, start its background refresh and return the router
pub async fn init_release_service(config: ReleaseConfig) -> Result<Router> {
    debug!(
        "Initializing release service for {}/{} (proxy mode: {})",
        config.account,
        config.repository,
        config.proxy_mode()
    );

    let cache = Arc::new(
        GitHubReleaseCache::new(&config).context("Failed to create release cache")?,
    );
    cache.clone().spawn_refresh();

    let renderer = Arc::new(HandlebarsOverview::new().context("Failed to load overview template")?);
    let state = Arc::new(
        AppState::new(config, cache, renderer).context("Failed to create application state")?,
    );

    Ok(create_router(state))
}

// Re-export commonly used types
pub use config::ReleaseConfig;
pub use error::{ErrorResponse, ReleaseServiceError, StructuredError};
pub use platform::{ClientSignals, Platform};
pub use types::{PlatformAsset, Snapshot, UpdateResponse};
