//! Public redirect or authenticated proxy redirect for release assets

use std::time::Duration;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::header::{ACCEPT, LOCATION};
use tracing::{debug, instrument};
use url::Url;

use crate::{error::ReleaseServiceError, types::PlatformAsset};

/// A `302 Found` pointing the client at the download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRedirect {
    pub location: String,
}

impl IntoResponse for DownloadRedirect {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(header::LOCATION, self.location)]).into_response()
    }
}

pub struct Dispatcher {
    token: Option<String>,
    client: reqwest::Client,
}

fn build_http_client() -> Result<reqwest::Client, ReleaseServiceError> {
    // The upstream answers with a signed storage URL; following it would
    // download the asset through this process.
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("be-release-service/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ReleaseServiceError::Config(format!("HTTP client: {e}")))
}

impl Dispatcher {
    pub fn new(token: Option<String>) -> Result<Self, ReleaseServiceError> {
        Ok(Self {
            token: token.filter(|t| !t.is_empty()),
            client: build_http_client()?,
        })
    }

    pub fn proxy_mode(&self) -> bool {
        self.token.is_some()
    }

    #[instrument(skip(self, asset), fields(asset = %asset.name, proxy = self.proxy_mode()))]
    pub async fn dispatch(
        &self,
        asset: &PlatformAsset,
    ) -> Result<DownloadRedirect, ReleaseServiceError> {
        let Some(token) = self.token.as_deref() else {
            debug!("Redirecting to public asset URL");
            return Ok(DownloadRedirect {
                location: asset.url.clone(),
            });
        };

        let location = self.resolve_private_location(token, &asset.api_url).await?;
        debug!("Upstream resolved private asset location");
        Ok(DownloadRedirect { location })
    }

    /// Ask the upstream API where the asset lives, with the token carried in
    /// the URL userinfo. The upstream must answer with a redirect.
    async fn resolve_private_location(
        &self,
        token: &str,
        api_url: &str,
    ) -> Result<String, ReleaseServiceError> {
        let mut url = Url::parse(api_url).map_err(|e| {
            ReleaseServiceError::Upstream(format!("asset API URL is not valid: {e}"))
        })?;
        url.set_username(token).map_err(|_| {
            ReleaseServiceError::Upstream("asset API URL cannot carry credentials".into())
        })?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|e| ReleaseServiceError::Upstream(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_redirection() {
            return Err(ReleaseServiceError::Upstream(format!(
                "expected a redirect from the asset API, got {status}"
            )));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ReleaseServiceError::Upstream("asset API redirect has no Location header".into())
            })
    }
}
