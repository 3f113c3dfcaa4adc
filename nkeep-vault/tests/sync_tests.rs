//! Reconciler behaviour against fake collaborators
//!
//! Covers idempotence, per-note failure isolation, resumability after
//! cancellation or a crash, and media failure cleanup.

mod common;

use common::*;
use nkeep_vault::models::SyncState;
use nkeep_vault::repository::Repository;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_sync_twice_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let library = open_library(&temp, 2).await;
    let source = FakeSource::new();
    let downloader = FakeDownloader::new();
    let items = vec![item("Pets", "a1"), item("Pets", "a2")];

    let first = library
        .reconciler()
        .sync(&items, &source, &downloader, &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!((first.succeeded, first.failed, first.skipped), (2, 0, 0));

    let second = library
        .reconciler()
        .sync(&items, &source, &downloader, &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!((second.succeeded, second.failed, second.skipped), (0, 0, 2));

    // No re-fetch, no duplicate media, no duplicate folders
    assert_eq!(source.calls().len(), 2);
    assert_eq!(downloader.count(), 4);
    let library_dir = temp.path().join("library");
    assert_eq!(note_folders(&library_dir, "Pets"), vec!["Title a1_a1", "Title a2_a2"]);
}

#[tokio::test]
async fn test_failed_fetch_is_isolated_and_retried() {
    let temp = TempDir::new().unwrap();
    let library = open_library(&temp, 2).await;
    let source = FakeSource::failing(&["a2"]);
    let downloader = FakeDownloader::new();
    let items = vec![item("Pets", "a1"), item("Pets", "a2")];

    let summary = library
        .reconciler()
        .sync(&items, &source, &downloader, &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!((summary.succeeded, summary.failed), (1, 1));
    assert_eq!(summary.failures[0].note_id, "a2");
    assert_eq!(summary.failures[0].operation, "fetch_detail");
    assert!(summary.failures[0].message.contains("a2"));

    let repo = library.repository();
    assert!(repo.contains("a1").unwrap());
    assert!(!repo.contains("a2").unwrap());

    // The re-run only re-attempts a2
    source.heal("a2");
    let rerun = library
        .reconciler()
        .sync(&items, &source, &downloader, &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!((rerun.succeeded, rerun.skipped), (1, 1));

    let mut calls = source.calls();
    calls.sort();
    assert_eq!(calls, vec!["a1", "a2", "a2"]);
    assert!(repo.contains("a2").unwrap());
}

#[tokio::test]
async fn test_cancelled_sync_resumes_remaining_notes() {
    let temp = TempDir::new().unwrap();
    let library = open_library(&temp, 1).await;
    let token = CancellationToken::new();
    let source = FakeSource {
        cancel_after: Some((2, token.clone())),
        ..FakeSource::new()
    };
    let downloader = FakeDownloader::new();
    let items: Vec<_> = ["n1", "n2", "n3", "n4", "n5"]
        .iter()
        .map(|id| item("Pets", id))
        .collect();

    let first = library
        .reconciler()
        .sync(&items, &source, &downloader, &token, None)
        .await
        .unwrap();
    assert_eq!(first.succeeded, 2);
    assert_eq!(first.cancelled, 3);

    let resume_source = FakeSource::new();
    let second = library
        .reconciler()
        .sync(&items, &resume_source, &downloader, &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!((second.succeeded, second.skipped), (3, 2));
    let mut resumed = resume_source.calls();
    resumed.sort();
    assert_eq!(resumed, vec!["n3", "n4", "n5"]);
}

#[tokio::test]
async fn test_media_failure_leaves_nothing_behind() {
    let temp = TempDir::new().unwrap();
    let library = open_library(&temp, 2).await;
    let source = FakeSource::new();
    let downloader = FakeDownloader::failing_on("/bad/");
    let items = vec![item("Pets", "good"), item("Pets", "bad")];

    let summary = library
        .reconciler()
        .sync(&items, &source, &downloader, &CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!((summary.succeeded, summary.failed), (1, 1));
    assert_eq!(summary.failures[0].operation, "download_media");
    assert!(!library.repository().contains("bad").unwrap());

    // No staging folder survives the failure
    let library_dir = temp.path().join("library");
    assert_eq!(note_folders(&library_dir, "Pets"), vec!["Title good_good"]);
}

#[tokio::test]
async fn test_interrupted_staging_is_swept_and_refetched() {
    let temp = TempDir::new().unwrap();
    let partial = temp.path().join("library/Pets/.partial-Title a1_a1");
    std::fs::create_dir_all(&partial).unwrap();
    std::fs::write(partial.join("image_0.jpg"), b"half").unwrap();

    let library = open_library(&temp, 2).await;
    assert!(!partial.exists());
    assert!(!library.repository().contains("a1").unwrap());

    let source = FakeSource::new();
    let summary = library
        .reconciler()
        .sync(&[item("Pets", "a1")], &source, &FakeDownloader::new(), &CancellationToken::new(), None)
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(library.repository().get("a1").unwrap().has_local);
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let temp = TempDir::new().unwrap();
    {
        let library = open_library(&temp, 2).await;
        library
            .reconciler()
            .sync(
                &[item("Pets", "a1")],
                &FakeSource::new(),
                &FakeDownloader::new(),
                &CancellationToken::new(),
                None,
            )
            .await
            .unwrap();
    }

    // A fresh repository rebuilds its index from disk
    let repo = Repository::open(temp.path().join("library"), temp.path().join("listing.json"))
        .unwrap();
    assert!(repo.contains("a1").unwrap());
}

#[tokio::test]
async fn test_listing_notes_count_as_pending_until_synced() {
    let temp = TempDir::new().unwrap();
    let library = open_library(&temp, 2).await;
    let listing = listing("Pets", &["a1", "a2", "a3"]);

    library.record_listing(&listing).unwrap();
    let stats = library.stats().await.unwrap();
    assert_eq!((stats.downloaded_count, stats.pending_count), (0, 3));
    assert_eq!(stats.progress_pct, 0.0);

    let pending = library.get_note("a2").await.unwrap();
    assert!(!pending.has_local);
    assert!(pending.media_refs.is_empty());

    let source = FakeSource::failing(&["a3"]);
    library
        .sync_listing(
            &listing,
            &source,
            &FakeDownloader::new(),
            &CancellationToken::new(),
            None,
            false,
        )
        .await
        .unwrap();

    let stats = library.stats().await.unwrap();
    assert_eq!((stats.downloaded_count, stats.pending_count), (2, 1));
    assert_eq!(stats.progress_pct, 66.7);
    assert!(stats.storage_bytes > 0);
}

#[tokio::test]
async fn test_sync_manager_runs_one_session_at_a_time() {
    let temp = TempDir::new().unwrap();
    let library = Arc::new(open_library(&temp, 1).await);
    let manager = nkeep_vault::sync_manager::SyncManager::new();

    let session = manager
        .start(
            Arc::clone(&library),
            Arc::new(FakeSource::new()),
            Arc::new(FakeDownloader::new()),
            listing("Pets", &["a1", "a2"]),
            false,
        )
        .await
        .unwrap();
    assert_eq!(session.state, SyncState::Running);

    manager.wait().await;
    let done = manager.status().unwrap().unwrap();
    assert_eq!(done.state, SyncState::Completed);
    assert_eq!(done.summary.unwrap().succeeded, 2);
    assert!(done.ended_at.is_some());

    // A finished session does not block the next one
    manager
        .start(
            Arc::clone(&library),
            Arc::new(FakeSource::new()),
            Arc::new(FakeDownloader::new()),
            listing("Pets", &["a1", "a2"]),
            false,
        )
        .await
        .unwrap();
    manager.wait().await;
    assert_eq!(
        manager.status().unwrap().unwrap().summary.unwrap().skipped,
        2
    );
}
