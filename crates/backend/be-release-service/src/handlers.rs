use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Json, Response},
};
use tracing::{debug, instrument};

use crate::{
    dispatch::DownloadRedirect,
    error::{ReleaseServiceError, StructuredError},
    service::AppState,
    types::{DownloadQuery, PlatformParams, UpdateParams},
};

#[instrument(skip(state, headers), fields(update = query.is_update()))]
pub async fn latest_download_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> Result<DownloadRedirect, ReleaseServiceError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    debug!("Latest download for user agent {:?}", user_agent);

    state.latest_download(user_agent, query.is_update()).await
}

#[instrument(skip(state), fields(platform = %params.platform, update = query.is_update()))]
pub async fn platform_download_handler(
    State(state): State<Arc<AppState>>,
    Path(params): Path<PlatformParams>,
    Query(query): Query<DownloadQuery>,
) -> Result<DownloadRedirect, ReleaseServiceError> {
    state
        .platform_download(&params.platform, query.is_update())
        .await
}

#[instrument(skip(state), fields(platform = %params.platform, version = %params.version))]
pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path(params): Path<UpdateParams>,
) -> Response {
    match state
        .check_for_update(&params.platform, &params.version)
        .await
    {
        Ok(Some(update)) => {
            debug!("Update available: version {}", update.name);
            (StatusCode::OK, Json(update)).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => StructuredError(e).into_response(),
    }
}

#[instrument(skip(state))]
pub async fn release_list_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.release_list().await {
        Ok(content) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            content,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

#[instrument(skip(state))]
pub async fn overview_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, ReleaseServiceError> {
    state.overview().await.map(Html)
}

pub async fn health_handler() -> StatusCode {
    StatusCode::OK
}
