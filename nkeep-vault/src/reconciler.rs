//! Incremental reconciler
//!
//! Compares a remote listing with the repository and downloads only notes
//! that are not stored yet. A note counts as stored once its metadata file
//! exists, and metadata is written only after every media file has landed,
//! so an interrupted run is resumed simply by running it again.

use futures::stream::{self, StreamExt};
use nkeep_common::config::SyncConfig;
use nkeep_common::{Error, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::naming::storage_album_name;
use crate::models::{Note, RemoteItem, SyncFailure, SyncProgress, SyncSummary};
use crate::repository::{missing_media, Repository};
use crate::services::{MediaDownloader, NoteSource, RequestPacer};

/// Callback receiving progress after each processed note
pub type ProgressFn = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// Pacing for one reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub concurrency: usize,
    /// Minimum spacing between detail-fetch starts, across all workers
    pub request_interval: Duration,
    /// Pause between media downloads of the same note
    pub media_interval: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            concurrency: config.effective_concurrency(),
            request_interval: Duration::from_millis(config.request_interval_ms),
            media_interval: Duration::from_millis(config.media_interval_ms),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Remote items split by whether the repository already stores them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncDiff {
    pub new: Vec<RemoteItem>,
    pub existing: Vec<RemoteItem>,
}

enum Outcome {
    Succeeded,
    Failed(SyncFailure),
    Cancelled,
}

fn failure(note_id: &str, operation: &str, err: &Error) -> Outcome {
    warn!(note_id = %note_id, operation, error = %err, "Note sync failed");
    Outcome::Failed(SyncFailure {
        note_id: note_id.to_string(),
        operation: operation.to_string(),
        message: err.to_string(),
    })
}

pub struct Reconciler {
    repo: Arc<Repository>,
    settings: SyncSettings,
}

impl Reconciler {
    pub fn new(repo: Arc<Repository>, settings: SyncSettings) -> Self {
        Self {
            repo,
            settings: SyncSettings {
                concurrency: settings.concurrency.max(1),
                ..settings
            },
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Split items into new and already-stored, listing order kept
    ///
    /// Repeated ids are kept once (first occurrence).
    pub fn diff(&self, items: &[RemoteItem]) -> Result<SyncDiff> {
        let mut seen = HashSet::new();
        let mut diff = SyncDiff::default();

        for item in items {
            let id = item.id();
            if !seen.insert(id.clone()) {
                debug!(note_id = %id, "Duplicate id in remote list");
                continue;
            }
            if self.repo.contains(&id)? {
                diff.existing.push(item.clone());
            } else {
                diff.new.push(item.clone());
            }
        }
        Ok(diff)
    }

    /// Fetch and store every new note
    ///
    /// Per-note failures are collected in the summary and never abort the
    /// batch; a failed note leaves nothing on disk and is retried by the
    /// next run. Notes not started before `cancel` fires are reported as
    /// cancelled.
    pub async fn sync(
        &self,
        items: &[RemoteItem],
        source: &dyn NoteSource,
        downloader: &dyn MediaDownloader,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
    ) -> Result<SyncSummary> {
        let diff = self.diff(items)?;
        let total = diff.new.len();
        let mut summary = SyncSummary {
            skipped: diff.existing.len(),
            ..SyncSummary::default()
        };

        info!(
            new = total,
            skipped = summary.skipped,
            workers = self.settings.concurrency,
            "Starting sync"
        );

        let pacer = RequestPacer::new(self.settings.request_interval);
        let processed = AtomicUsize::new(0);

        let pacer = &pacer;
        let processed = &processed;
        let progress = progress.as_ref();

        let outcomes: Vec<Outcome> = stream::iter(diff.new)
            .map(move |item: RemoteItem| async move {
                let outcome = self
                    .sync_one(&item, source, downloader, pacer, cancel)
                    .await;
                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(report) = progress {
                    report(SyncProgress::new(done, total));
                }
                outcome
            })
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Outcome::Succeeded => summary.succeeded += 1,
                Outcome::Failed(f) => {
                    summary.failed += 1;
                    summary.failures.push(f);
                }
                Outcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary.failures.sort_by(|a, b| a.note_id.cmp(&b.note_id));

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "Sync finished"
        );
        Ok(summary)
    }

    async fn sync_one(
        &self,
        item: &RemoteItem,
        source: &dyn NoteSource,
        downloader: &dyn MediaDownloader,
        pacer: &RequestPacer,
        cancel: &CancellationToken,
    ) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }
        tokio::select! {
            _ = cancel.cancelled() => return Outcome::Cancelled,
            _ = pacer.until_ready() => {}
        }

        let note_ref = item.summary.note_ref();
        let detail = match source.fetch_detail(&note_ref).await {
            Ok(detail) => detail,
            Err(e) => return failure(&note_ref.id, "fetch_detail", &e),
        };

        let album = storage_album_name(&item.album);
        let note = Note::from_detail(detail, &item.summary, &item.album);
        let staged = match self.repo.stage(&album, note) {
            Ok(staged) => staged,
            Err(e) => return failure(&note_ref.id, "persist", &e),
        };

        let media = staged.note().media.clone();
        for (idx, media_ref) in media.iter().enumerate() {
            if idx > 0 && !self.settings.media_interval.is_zero() {
                tokio::time::sleep(self.settings.media_interval).await;
            }
            if let Err(e) = downloader
                .download(&media_ref.url, &staged.media_path(media_ref))
                .await
            {
                // Dropping the stage discards the partial folder
                return failure(&note_ref.id, "download_media", &e);
            }
        }

        match self.repo.commit(staged) {
            Ok(record) => {
                debug!(note_id = %note_ref.id, album = %record.album, "Stored note");
                Outcome::Succeeded
            }
            Err(e) => failure(&note_ref.id, "persist", &e),
        }
    }

    /// Re-download media files missing from stored notes
    ///
    /// Uses the URLs recorded in metadata; details are never re-fetched.
    pub async fn repair_media(
        &self,
        downloader: &dyn MediaDownloader,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary> {
        let incomplete = self.repo.incomplete_notes()?;
        let mut summary = SyncSummary::default();
        info!(notes = incomplete.len(), "Repairing missing media");

        for record in incomplete {
            if cancel.is_cancelled() {
                summary.cancelled += 1;
                continue;
            }
            let Some(folder) = record.folder.as_ref() else {
                continue;
            };

            let mut error = None;
            for (idx, media_ref) in missing_media(folder, &record.note).into_iter().enumerate() {
                if idx > 0 && !self.settings.media_interval.is_zero() {
                    tokio::time::sleep(self.settings.media_interval).await;
                }
                if let Err(e) = downloader
                    .download(&media_ref.url, &folder.join(&media_ref.file))
                    .await
                {
                    error = Some(e);
                    break;
                }
            }

            if let Err(e) = self.repo.refresh_note(&record.note.id) {
                warn!(note_id = %record.note.id, error = %e, "Failed to refresh repaired note");
            }

            match error {
                None => summary.succeeded += 1,
                Some(e) => {
                    if let Outcome::Failed(f) = failure(&record.note.id, "repair_media", &e) {
                        summary.failed += 1;
                        summary.failures.push(f);
                    }
                }
            }
        }

        info!(
            repaired = summary.succeeded,
            failed = summary.failed,
            "Media repair finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NoteDetail, NoteRef, RemoteSummary};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeSource {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NoteSource for FakeSource {
        async fn fetch_detail(&self, note: &NoteRef) -> Result<NoteDetail> {
            self.calls.lock().unwrap().push(note.id.clone());
            Ok(NoteDetail {
                image_urls: vec![format!("https://i/{}.jpg", note.id)],
                ..NoteDetail::default()
            })
        }
    }

    struct FakeDownloader;

    #[async_trait]
    impl MediaDownloader for FakeDownloader {
        async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
            std::fs::write(dest, url.as_bytes())?;
            Ok(url.len() as u64)
        }
    }

    fn fast() -> SyncSettings {
        SyncSettings {
            concurrency: 2,
            request_interval: Duration::ZERO,
            media_interval: Duration::ZERO,
        }
    }

    fn setup() -> (TempDir, Arc<Repository>, Reconciler) {
        let temp = TempDir::new().unwrap();
        let repo = Arc::new(
            Repository::open(temp.path().join("library"), temp.path().join("listing.json"))
                .unwrap(),
        );
        let reconciler = Reconciler::new(Arc::clone(&repo), fast());
        (temp, repo, reconciler)
    }

    #[tokio::test]
    async fn test_diff_dedups_and_splits() {
        let (_temp, repo, reconciler) = setup();
        repo.put("Pets", &Note::from_summary(&RemoteSummary::new("a", "A"), "Pets"))
            .unwrap();

        let items = vec![
            RemoteItem::new("Pets", RemoteSummary::new("a", "A")),
            RemoteItem::new("Pets", RemoteSummary::new("b?xsec_token=T", "B")),
            RemoteItem::new("Other", RemoteSummary::new("b", "B")),
        ];
        let diff = reconciler.diff(&items).unwrap();

        assert_eq!(diff.existing.len(), 1);
        assert_eq!(diff.new.len(), 1);
        assert_eq!(diff.new[0].album, "Pets");
    }

    #[tokio::test]
    async fn test_sync_reports_progress() {
        let (_temp, _repo, reconciler) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p.current));

        let items: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| RemoteItem::new("Pets", RemoteSummary::new(*id, *id)))
            .collect();
        let source = FakeSource { calls: Mutex::new(Vec::new()) };
        let summary = reconciler
            .sync(&items, &source, &FakeDownloader, &CancellationToken::new(), Some(progress))
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 3);
        let mut reported = seen.lock().unwrap().clone();
        reported.sort();
        assert_eq!(reported, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_reserved_remote_album_is_renamed() {
        let (temp, repo, reconciler) = setup();
        let items = vec![RemoteItem::new("星标", RemoteSummary::new("a", "A"))];
        let source = FakeSource { calls: Mutex::new(Vec::new()) };

        reconciler
            .sync(&items, &source, &FakeDownloader, &CancellationToken::new(), None)
            .await
            .unwrap();

        assert_eq!(repo.get("a").unwrap().album, "星标_");
        assert!(temp.path().join("library/星标_/A_a/image_0.jpg").is_file());
    }

    #[tokio::test]
    async fn test_repair_media_restores_missing_files() {
        let (temp, repo, reconciler) = setup();
        let items = vec![RemoteItem::new("Pets", RemoteSummary::new("a", "A"))];
        let source = FakeSource { calls: Mutex::new(Vec::new()) };
        reconciler
            .sync(&items, &source, &FakeDownloader, &CancellationToken::new(), None)
            .await
            .unwrap();

        let image = temp.path().join("library/Pets/A_a/image_0.jpg");
        std::fs::remove_file(&image).unwrap();
        assert!(!repo.get("a").unwrap().has_local);

        let summary = reconciler
            .repair_media(&FakeDownloader, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(image.is_file());
        assert!(repo.get("a").unwrap().has_local);
        // Detail was fetched once, by the original sync
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }
}
