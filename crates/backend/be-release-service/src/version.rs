//! Semantic version validation and update negotiation

use std::cmp::Ordering;

use semver::Version;
use tracing::{debug, instrument};

use crate::error::ReleaseServiceError;

/// Outcome of comparing a client version against the latest release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    UpToDate,
    UpdateAvailable,
}

/// Parse a version, tolerating a single leading `v` as release tags often carry one.
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.strip_prefix('v').unwrap_or(input);
    Version::parse(trimmed).ok()
}

pub fn is_valid_version(input: &str) -> bool {
    parse_version(input).is_some()
}

/// Semver precedence. Build metadata does not take part in the ordering.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp_precedence(b)
}

/// Decide whether a client running `client` should receive `latest`.
///
/// Any difference counts as an update, including a client that reports a
/// version newer than the latest release.
#[instrument(level = "debug")]
pub fn negotiate(latest: &str, client: &str) -> Result<UpdateDecision, ReleaseServiceError> {
    let client_version = parse_version(client)
        .ok_or_else(|| ReleaseServiceError::InvalidVersion(client.to_string()))?;
    let latest_version = parse_version(latest).ok_or_else(|| {
        ReleaseServiceError::SnapshotUnavailable(format!(
            "latest release version '{}' is not a valid semantic version",
            latest
        ))
    })?;

    let ordering = compare(&latest_version, &client_version);
    debug!(
        "Latest {} compared to client {}: {:?}",
        latest_version, client_version, ordering
    );

    Ok(match ordering {
        Ordering::Equal => UpdateDecision::UpToDate,
        Ordering::Less | Ordering::Greater => UpdateDecision::UpdateAvailable,
    })
}
