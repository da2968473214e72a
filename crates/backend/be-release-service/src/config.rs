use std::time::Duration;

use crate::error::ReleaseServiceError;

const DEFAULT_INTERVAL_MINUTES: u64 = 15;

#[derive(Debug, Clone)]
pub struct ReleaseConfig {
    pub account: String,
    pub repository: String,
    /// Access token for private releases. Its presence turns on proxy mode.
    pub token: Option<String>,
    /// Public base URL of this service, e.g. `https://updates.example.com`
    pub public_url: Option<String>,
    pub interval: Duration,
    pub include_prereleases: bool,
}

impl ReleaseConfig {
    pub fn from_env() -> Result<Self, ReleaseServiceError> {
        let account = std::env::var("ACCOUNT").map_err(|_| {
            ReleaseServiceError::Config("ACCOUNT environment variable must be set".into())
        })?;

        let repository = std::env::var("REPOSITORY").map_err(|_| {
            ReleaseServiceError::Config("REPOSITORY environment variable must be set".into())
        })?;

        let token = std::env::var("TOKEN").ok().filter(|s| !s.is_empty());

        let public_url = std::env::var("URL")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|u| normalize_public_url(&u));

        if token.is_some() && public_url.is_none() {
            return Err(ReleaseServiceError::Config(
                "URL environment variable must be set when TOKEN is set".into(),
            ));
        }

        let interval = parse_interval(std::env::var("INTERVAL").ok().as_deref())?;

        let include_prereleases = std::env::var("PRE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        Ok(Self {
            account,
            repository,
            token,
            public_url,
            interval,
            include_prereleases,
        })
    }

    pub fn proxy_mode(&self) -> bool {
        self.token.is_some()
    }

    pub fn repository_url(&self) -> String {
        format!("https://github.com/{}/{}", self.account, self.repository)
    }

    pub fn releases_api_url(&self) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/releases?per_page=100",
            self.account, self.repository
        )
    }
}

/// Refresh interval in whole minutes, defaulting when unset.
fn parse_interval(raw: Option<&str>) -> Result<Duration, ReleaseServiceError> {
    let minutes = match raw {
        Some(raw) => raw.parse::<u64>().map_err(|e| {
            ReleaseServiceError::Config(format!(
                "INTERVAL '{raw}' is not a whole number of minutes: {e}"
            ))
        })?,
        None => DEFAULT_INTERVAL_MINUTES,
    };
    if minutes == 0 {
        return Err(ReleaseServiceError::Config(
            "INTERVAL must be at least one minute".into(),
        ));
    }

    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ReleaseServiceError::Config(format!("INTERVAL {minutes} is too large")))
}

/// Accepts a bare host (`updates.example.com`) or a full base URL.
fn normalize_public_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}
