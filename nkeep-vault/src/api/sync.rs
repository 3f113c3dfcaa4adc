//! Sync session endpoints
//!
//! POST /api/sync, GET /api/sync/status, POST /api/sync/cancel

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::models::{RemoteListing, SyncSession};
use crate::AppState;

/// POST /api/sync request
#[derive(Debug, Deserialize)]
pub struct StartSyncRequest {
    /// Listing in the scraper's shape: `[{name, notes: [...]}]`
    pub listing: RemoteListing,
    /// Also re-download missing media of stored notes
    #[serde(default)]
    pub repair: bool,
}

/// POST /api/sync
///
/// Returns 202 with the new session; 409 if a sync is already running.
pub async fn start_sync(
    State(state): State<AppState>,
    Json(request): Json<StartSyncRequest>,
) -> ApiResult<(StatusCode, Json<SyncSession>)> {
    let source = state.source.clone().ok_or_else(|| {
        ApiError::BadRequest("no detail endpoint configured; set sync.detail_endpoint".to_string())
    })?;

    let session = state
        .sync
        .start(
            Arc::clone(&state.library),
            source,
            Arc::clone(&state.downloader),
            request.listing,
            request.repair,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(session)))
}

/// GET /api/sync/status
pub async fn sync_status(State(state): State<AppState>) -> ApiResult<Json<SyncSession>> {
    state
        .sync
        .status()?
        .map(Json)
        .ok_or_else(|| nkeep_common::Error::NotFound("no sync session".to_string()).into())
}

/// POST /api/sync/cancel
pub async fn cancel_sync(State(state): State<AppState>) -> ApiResult<Json<SyncSession>> {
    Ok(Json(state.sync.cancel()?))
}

pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync", post(start_sync))
        .route("/api/sync/status", get(sync_status))
        .route("/api/sync/cancel", post(cancel_sync))
}
