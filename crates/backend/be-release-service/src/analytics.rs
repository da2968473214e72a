use std::sync::atomic::{AtomicBool, Ordering};

use posthog_rs::Event;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize the global PostHog client. Events are dropped until this succeeds.
pub async fn init(api_key: &str) -> anyhow::Result<()> {
    posthog_rs::init_global(api_key)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize PostHog: {e}"))?;
    ENABLED.store(true, Ordering::Relaxed);
    Ok(())
}

fn capture_async(event: Event) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }

    tokio::spawn(async move {
        if let Err(e) = posthog_rs::capture(event).await {
            tracing::error!("Failed to capture posthog event: {}", e);
        }
    });
}

pub fn track_update_check(
    platform: &str,
    current_version: &str,
    update_available: bool,
    latest_version: Option<&str>,
) {
    let mut event = Event::new_anon("update_check");
    event.insert_prop("platform", platform).ok();
    event.insert_prop("current_version", current_version).ok();
    event.insert_prop("update_available", update_available).ok();
    if let Some(v) = latest_version {
        event.insert_prop("latest_version", v).ok();
    }
    capture_async(event);
}

pub fn track_update_check_failed(platform: &str, current_version: &str, error_kind: &str) {
    let mut event = Event::new_anon("update_check_failed");
    event.insert_prop("platform", platform).ok();
    event.insert_prop("current_version", current_version).ok();
    event.insert_prop("error_kind", error_kind).ok();
    capture_async(event);
}

pub fn track_download_redirect(platform: &str, is_update: bool, proxied: bool) {
    let mut event = Event::new_anon("download_redirect");
    event.insert_prop("platform", platform).ok();
    event.insert_prop("is_update", is_update).ok();
    event.insert_prop("proxied", proxied).ok();
    capture_async(event);
}

pub fn track_download_failed(platform: Option<&str>, is_update: bool, error_kind: &str) {
    let mut event = Event::new_anon("download_failed");
    if let Some(p) = platform {
        event.insert_prop("platform", p).ok();
    }
    event.insert_prop("is_update", is_update).ok();
    event.insert_prop("error_kind", error_kind).ok();
    capture_async(event);
}
