//! Album endpoints
//!
//! GET /api/albums, POST /api/albums, DELETE /api/albums/:album/notes/:id

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::models::AlbumEntry;
use crate::AppState;

/// POST /api/albums request
#[derive(Debug, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: String,
}

/// GET /api/albums
///
/// Virtual views first, then remote and custom albums, with live counts.
pub async fn list_albums(State(state): State<AppState>) -> ApiResult<Json<Vec<AlbumEntry>>> {
    Ok(Json(state.library.list_albums().await?))
}

/// POST /api/albums
pub async fn create_album(
    State(state): State<AppState>,
    Json(request): Json<CreateAlbumRequest>,
) -> ApiResult<(StatusCode, Json<AlbumEntry>)> {
    let album = state.library.create_album(&request.name).await?;
    Ok((StatusCode::CREATED, Json(album)))
}

/// DELETE /api/albums/:album/notes/:id
///
/// Removes a copy; the album itself always survives.
pub async fn remove_from_album(
    State(state): State<AppState>,
    Path((album, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.library.remove_from_album(&album, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn album_routes() -> Router<AppState> {
    Router::new()
        .route("/api/albums", get(list_albums).post(create_album))
        .route("/api/albums/:album/notes/:id", delete(remove_from_album))
}
