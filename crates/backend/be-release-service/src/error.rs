use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::platform::Platform;

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReleaseServiceError {
    #[error("Invalid version format: {0}")]
    InvalidVersion(String),

    #[error("Invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("Could not detect a platform from the client")]
    PlatformUndetected,

    #[error("No asset published for platform {0}")]
    AssetNotFound(Platform),

    #[error("Release snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("Release list file not present in the latest release")]
    ReleaseListMissing,

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Failed to render overview: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReleaseServiceError {
    /// True for well formed requests whose data simply does not exist yet
    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            ReleaseServiceError::PlatformUndetected
                | ReleaseServiceError::AssetNotFound(_)
                | ReleaseServiceError::SnapshotUnavailable(_)
                | ReleaseServiceError::ReleaseListMissing
        )
    }

    /// Stable machine readable code used in structured error bodies
    pub fn code(&self) -> &'static str {
        match self {
            ReleaseServiceError::InvalidVersion(_) => "version_invalid",
            ReleaseServiceError::InvalidPlatform(_) => "invalid_platform",
            ReleaseServiceError::PlatformUndetected => "platform_undetected",
            ReleaseServiceError::AssetNotFound(_) => "asset_not_found",
            ReleaseServiceError::SnapshotUnavailable(_) => "snapshot_unavailable",
            ReleaseServiceError::ReleaseListMissing => "release_list_missing",
            ReleaseServiceError::Upstream(_) => "upstream_failure",
            ReleaseServiceError::Render(_) => "render_failure",
            ReleaseServiceError::Config(_) => "configuration_error",
        }
    }

    fn log(&self) {
        match self {
            ReleaseServiceError::InvalidVersion(_) | ReleaseServiceError::InvalidPlatform(_) => {
                warn!("Rejected client input: {}", self)
            }
            e if e.is_data_unavailable() => debug!("Data unavailable: {}", e),
            e => error!("Release service failure: {}", e),
        }
    }
}

/// Plain text status line, used by the redirect and passthrough endpoints.
impl IntoResponse for ReleaseServiceError {
    fn into_response(self) -> Response {
        self.log();

        let (status, message) = match &self {
            ReleaseServiceError::InvalidVersion(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The specified version is not SemVer-compatible",
            ),
            ReleaseServiceError::InvalidPlatform(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The specified platform is not valid",
            ),
            ReleaseServiceError::PlatformUndetected
            | ReleaseServiceError::SnapshotUnavailable(_) => (
                StatusCode::NOT_FOUND,
                "No download available for your platform!",
            ),
            ReleaseServiceError::AssetNotFound(_) => (
                StatusCode::NOT_FOUND,
                "No download available for your platform",
            ),
            ReleaseServiceError::ReleaseListMissing => {
                return StatusCode::NO_CONTENT.into_response();
            }
            ReleaseServiceError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "Download is temporarily unavailable",
            ),
            ReleaseServiceError::Render(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error reading overview file",
            ),
            ReleaseServiceError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}

/// JSON `{error, message}` body for the update endpoint.
///
/// Data gaps stay silent here and answer `204 No Content`.
#[derive(Debug)]
pub struct StructuredError(pub ReleaseServiceError);

impl IntoResponse for StructuredError {
    fn into_response(self) -> Response {
        let StructuredError(inner) = self;
        inner.log();

        let (status, message) = match &inner {
            e if e.is_data_unavailable() => return StatusCode::NO_CONTENT.into_response(),
            ReleaseServiceError::InvalidVersion(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The specified version is not SemVer-compatible",
            ),
            ReleaseServiceError::InvalidPlatform(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The specified platform is not valid",
            ),
            ReleaseServiceError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "Release host is temporarily unavailable",
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        (
            status,
            Json(ErrorResponse {
                error: inner.code().to_owned(),
                message: message.to_owned(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_status_mapping() {
        let cases = [
            (
                ReleaseServiceError::InvalidPlatform("beos".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ReleaseServiceError::PlatformUndetected, StatusCode::NOT_FOUND),
            (
                ReleaseServiceError::AssetNotFound(Platform::Deb),
                StatusCode::NOT_FOUND,
            ),
            (ReleaseServiceError::ReleaseListMissing, StatusCode::NO_CONTENT),
            (
                ReleaseServiceError::Upstream("boom".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ReleaseServiceError::Render("bad template".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_structured_data_gaps_are_silent() {
        let response =
            StructuredError(ReleaseServiceError::AssetNotFound(Platform::Exe)).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response =
            StructuredError(ReleaseServiceError::SnapshotUnavailable("cold".into())).into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_structured_client_errors_are_500() {
        let response =
            StructuredError(ReleaseServiceError::InvalidVersion("abc".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
