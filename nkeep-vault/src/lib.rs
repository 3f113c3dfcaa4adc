//! nkeep-vault: local vault for collected notes
//!
//! Mirrors remote note collections into a browsable on-disk library,
//! incrementally, and layers user albums and learned/starred flags on top.
//! The library is served over HTTP for the presentation layer.

pub mod api;
pub mod db;
pub mod error;
pub mod library;
pub mod models;
pub mod organizer;
pub mod overlay;
pub mod pagination;
pub mod reconciler;
pub mod repository;
pub mod services;
pub mod sync_manager;

pub use crate::error::{ApiError, ApiResult};
pub use crate::library::{Library, NoteQuery};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::services::{MediaDownloader, NoteSource};
use crate::sync_manager::SyncManager;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    pub sync: Arc<SyncManager>,
    /// Detail-fetch collaborator; `None` disables sync
    pub source: Option<Arc<dyn NoteSource>>,
    pub downloader: Arc<dyn MediaDownloader>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        library: Arc<Library>,
        source: Option<Arc<dyn NoteSource>>,
        downloader: Arc<dyn MediaDownloader>,
    ) -> Self {
        Self {
            library,
            sync: Arc::new(SyncManager::new()),
            source,
            downloader,
            startup_time: Utc::now(),
        }
    }
}

/// API routes plus `/media/<album>/<folder>/<file>` served from the library
pub fn build_router(state: AppState) -> Router {
    let media = ServeDir::new(state.library.repository().library_path());

    Router::new()
        .merge(api::album_routes())
        .merge(api::note_routes())
        .merge(api::stats_routes())
        .merge(api::sync_routes())
        .merge(api::health_routes())
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
