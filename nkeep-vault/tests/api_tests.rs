//! Integration tests for the nkeep-vault HTTP API
//!
//! Each test drives the router in-process with `oneshot` against a
//! temp library.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::*;
use nkeep_vault::services::{MediaDownloader, NoteSource};
use nkeep_vault::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

/// Test helper: state over a library seeded with three downloaded notes
async fn setup_state(temp: &TempDir, source: Option<Arc<dyn NoteSource>>) -> AppState {
    let library = open_library(temp, 2).await;
    let repo = library.repository();
    repo.put("Pets", &note("Pets", "a1", "Cat tricks")).unwrap();
    repo.put("Pets", &note("Pets", "a2", "Cat naps")).unwrap();
    repo.put("Food", &note("Food", "b1", "Noodles")).unwrap();

    let downloader: Arc<dyn MediaDownloader> = Arc::new(FakeDownloader::new());
    AppState::new(Arc::new(library), source, downloader)
}

fn app(state: &AppState) -> Router {
    build_router(state.clone())
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = app(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let response = app(&state).oneshot(test_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "nkeep-vault");
    assert_eq!(json["sync_available"], false);
}

#[tokio::test]
async fn test_list_notes_pagination() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let (status, json) = send(&state, test_request("GET", "/api/notes?page=2&page_size=2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["page"], 2);
    assert_eq!(json["page_size"], 2);
    assert_eq!(json["total_pages"], 2);
    assert_eq!(json["items"].as_array().unwrap().len(), 1);

    let (_, past_end) = send(&state, test_request("GET", "/api/notes?page=9")).await;
    assert!(past_end["items"].as_array().unwrap().is_empty());

    let (status, huge) =
        send(&state, test_request("GET", "/api/notes?page=9223372036854775807&page_size=100")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(huge["items"].as_array().unwrap().is_empty());

    let (_, pets) = send(&state, test_request("GET", "/api/notes?album=Pets")).await;
    assert_eq!(pets["total"], 2);
}

#[tokio::test]
async fn test_unknown_note_and_album() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let (status, json) = send(&state, test_request("GET", "/api/notes/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&state, test_request("GET", "/api/notes?album=Nowhere")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, test_request("POST", "/api/notes/nope/starred-status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_note_detail_paths() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let (status, json) = send(&state, test_request("GET", "/api/notes/a1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "a1");
    assert_eq!(json["album"], "Pets");
    assert_eq!(json["local_path"], "Pets/Cat tricks_a1");
    assert_eq!(json["has_local"], true);
}

#[tokio::test]
async fn test_toggle_starred_twice() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let (status, first) = send(&state, test_request("POST", "/api/notes/a1/starred-status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, json!({"id": "a1", "is_starred": true}));

    // Starred view is addressed by its display name
    let (_, starred) = send(&state, test_request("GET", "/api/notes?album=%E6%98%9F%E6%A0%87")).await;
    assert_eq!(starred["total"], 1);

    let (_, second) = send(&state, test_request("POST", "/api/notes/a1/starred-status")).await;
    assert_eq!(second["is_starred"], false);

    let (_, learned) = send(&state, test_request("POST", "/api/notes/a1/learning-status")).await;
    assert_eq!(learned, json!({"id": "a1", "is_learned": true}));
    let (_, unlearned) = send(&state, test_request("GET", "/api/notes?learning=unlearned")).await;
    assert_eq!(unlearned["total"], 2);
}

#[tokio::test]
async fn test_album_endpoints() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let (status, created) =
        send(&state, json_request("POST", "/api/albums", json!({"name": "Favorites"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Favorites");

    let (status, json) =
        send(&state, json_request("POST", "/api/albums", json!({"name": "Favorites"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "CONFLICT");

    let (status, copied) = send(
        &state,
        json_request("POST", "/api/notes/a1/copy", json!({"target_album": "Favorites"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(copied["linked_albums"], json!(["Favorites"]));

    let (status, _) = send(&state, test_request("DELETE", "/api/albums/Favorites/notes/a1")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &state,
        json_request("POST", "/api/notes/a2/move", json!({"target_album": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, moved) = send(
        &state,
        json_request("POST", "/api/notes/a2/move", json!({"target_album": "Favorites"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["album"], "Favorites");

    let (_, albums) = send(&state, test_request("GET", "/api/albums")).await;
    let names: Vec<&str> = albums
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(&names[3..], &["Food", "Pets", "Favorites"]);
}

#[tokio::test]
async fn test_search_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let (status, first) = send(&state, test_request("GET", "/api/search?q=cat")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["total"], 2);
    let (_, second) = send(&state, test_request("GET", "/api/search?q=cat")).await;
    assert_eq!(first, second);

    let (status, _) = send(&state, test_request("GET", "/api/search?q=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;
    state.library.record_listing(&listing("Pets", &["a1", "p1"])).unwrap();

    let (status, json) = send(&state, test_request("GET", "/api/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["downloaded_count"], 3);
    assert_eq!(json["pending_count"], 1);
    assert_eq!(json["progress_pct"], 75.0);
}

#[tokio::test]
async fn test_sync_requires_a_source() {
    let temp = TempDir::new().unwrap();
    let state = setup_state(&temp, None).await;

    let body = json!({"listing": [{"name": "Pets", "notes": [{"id": "c1", "title": "New"}]}]});
    let (status, _) = send(&state, json_request("POST", "/api/sync", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&state, test_request("GET", "/api/sync/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_session_lifecycle() {
    let temp = TempDir::new().unwrap();
    let source: Arc<dyn NoteSource> = Arc::new(FakeSource::new());
    let state = setup_state(&temp, Some(source)).await;

    let body = json!({"listing": [{"name": "Pets", "notes": [
        {"id": "a1", "title": "Cat tricks"},
        {"id": "c1", "title": "Kitten"}
    ]}]});
    let (status, session) = send(&state, json_request("POST", "/api/sync", body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(session["state"], "RUNNING");

    state.sync.wait().await;

    let (status, session) = send(&state, test_request("GET", "/api/sync/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["state"], "COMPLETED");
    assert_eq!(session["summary"]["succeeded"], 1);
    assert_eq!(session["summary"]["skipped"], 1);

    let (_, note) = send(&state, test_request("GET", "/api/notes/c1")).await;
    assert_eq!(note["has_local"], true);
    assert_eq!(note["media_refs"].as_array().unwrap().len(), 2);

    // Nothing running any more
    let (status, _) = send(&state, test_request("POST", "/api/sync/cancel")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
