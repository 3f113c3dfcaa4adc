//! Note endpoints: listing, detail, search, placement and status toggles

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::library::NoteQuery;
use crate::models::{LearningFilter, NoteType, NoteView};
use crate::pagination::{Page, PageRequest, DEFAULT_PAGE_SIZE};
use crate::AppState;

/// GET /api/notes query
#[derive(Debug, Default, Deserialize)]
pub struct ListNotesQuery {
    /// Album or virtual view name
    pub album: Option<String>,
    #[serde(rename = "type")]
    pub note_type: Option<NoteType>,
    pub learning: Option<LearningFilter>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// GET /api/search query
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// Move / copy request
#[derive(Debug, Deserialize)]
pub struct PlacementRequest {
    pub target_album: String,
}

#[derive(Debug, Serialize)]
pub struct LearningStatusResponse {
    pub id: String,
    pub is_learned: bool,
}

#[derive(Debug, Serialize)]
pub struct StarredStatusResponse {
    pub id: String,
    pub is_starred: bool,
}

fn page_request(page: Option<usize>, page_size: Option<usize>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), page_size.unwrap_or(DEFAULT_PAGE_SIZE))
}

/// GET /api/notes
pub async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListNotesQuery>,
) -> ApiResult<Json<Page<NoteView>>> {
    let query = NoteQuery {
        album: query.album.filter(|a| !a.is_empty()),
        note_type: query.note_type,
        learning: query.learning,
        page: page_request(query.page, query.page_size),
    };
    Ok(Json(state.library.list_notes(&query).await?))
}

/// GET /api/notes/:id
pub async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<NoteView>> {
    Ok(Json(state.library.get_note(&id).await?))
}

/// GET /api/search?q=
pub async fn search_notes(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<NoteView>>> {
    let request = page_request(query.page, query.page_size);
    Ok(Json(state.library.search_notes(&query.q, request).await?))
}

/// POST /api/notes/:id/move
pub async fn move_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PlacementRequest>,
) -> ApiResult<Json<NoteView>> {
    if request.target_album.trim().is_empty() {
        return Err(ApiError::BadRequest("target_album is required".to_string()));
    }
    Ok(Json(state.library.move_note(&id, &request.target_album).await?))
}

/// POST /api/notes/:id/copy
pub async fn copy_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PlacementRequest>,
) -> ApiResult<Json<NoteView>> {
    if request.target_album.trim().is_empty() {
        return Err(ApiError::BadRequest("target_album is required".to_string()));
    }
    Ok(Json(state.library.copy_note(&id, &request.target_album).await?))
}

/// POST /api/notes/:id/learning-status
pub async fn toggle_learning_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LearningStatusResponse>> {
    let is_learned = state.library.toggle_learned(&id).await?;
    Ok(Json(LearningStatusResponse { id, is_learned }))
}

/// POST /api/notes/:id/starred-status
pub async fn toggle_starred_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StarredStatusResponse>> {
    let is_starred = state.library.toggle_starred(&id).await?;
    Ok(Json(StarredStatusResponse { id, is_starred }))
}

pub fn note_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notes", get(list_notes))
        .route("/api/notes/:id", get(get_note))
        .route("/api/notes/:id/move", post(move_note))
        .route("/api/notes/:id/copy", post(copy_note))
        .route("/api/notes/:id/learning-status", post(toggle_learning_status))
        .route("/api/notes/:id/starred-status", post(toggle_starred_status))
        .route("/api/search", get(search_notes))
}
