use std::net::SocketAddr;

use be_release_service::{ReleaseConfig, analytics, init_release_service};

/// Configuration for running the release server.
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub release: ReleaseConfig,
    pub posthog_api_key: Option<String>,
    /// When this receiver gets a value, the server shuts down gracefully.
    pub shutdown: tokio::sync::watch::Receiver<()>,
}

pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(posthog_key) = config.posthog_api_key.as_deref() {
        match analytics::init(posthog_key).await {
            Ok(()) => tracing::info!("PostHog analytics initialized"),
            Err(e) => tracing::warn!("{}", e),
        }
    } else {
        tracing::info!("POSTHOG_API_KEY not set, analytics disabled");
    }

    let release_router = match init_release_service(config.release).await {
        Ok(router) => router,
        Err(e) => {
            tracing::error!("Failed to initialize release service: {:#}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting HTTP server at {}", config.http_addr);

    let mut http_shutdown = config.shutdown.clone();
    let http_listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    let result = axum::serve(
        http_listener,
        release_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = http_shutdown.changed().await;
        tracing::info!("Shutting down HTTP server...");
    })
    .await;

    if let Err(e) = result {
        tracing::error!("HTTP server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
