//! Library facade: the read/write API the presentation layer talks to
//!
//! Combines the repository, organizer, status overlay and reconciler into
//! note views with placement and flags filled in.

use nkeep_common::config::RootFolderInitializer;
use nkeep_common::{Error, Result, VIEW_ALL, VIEW_DOWNLOADED, VIEW_STARRED};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::db::{init_database_pool, unavailable_pool};
use crate::models::{
    AlbumEntry, AlbumKind, LearningFilter, LibraryStats, NoteStatus, NoteType, NoteView,
    RemoteListing, StatusSnapshot, SyncSummary,
};
use crate::organizer::Organizer;
use crate::overlay::StatusStore;
use crate::pagination::{Page, PageRequest};
use crate::reconciler::{ProgressFn, Reconciler, SyncSettings};
use crate::repository::{AlbumScope, NoteFilter, NoteRecord, Repository};
use crate::services::{MediaDownloader, NoteSource};

/// Listing query as the presentation layer sends it
#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
    /// Album or virtual view name; `None` means all notes
    pub album: Option<String>,
    pub note_type: Option<NoteType>,
    pub learning: Option<LearningFilter>,
    pub page: PageRequest,
}

pub struct Library {
    repo: Arc<Repository>,
    organizer: Organizer,
    status: StatusStore,
    reconciler: Reconciler,
}

impl Library {
    /// Open the library below a root folder, creating the layout if needed
    pub async fn open(root: &RootFolderInitializer, settings: SyncSettings) -> Result<Self> {
        root.ensure_directory_exists()?;
        let repo = Repository::open(root.library_path(), root.listing_path())?;
        let db_path = root.database_path();
        let pool = match init_database_pool(&db_path).await {
            Ok(pool) => pool,
            Err(e) => {
                // Notes live on disk; only albums, copies and flags need the database
                warn!(
                    path = %db_path.display(),
                    error = %e,
                    "Database unreadable, serving notes without custom albums or flags"
                );
                unavailable_pool().await
            }
        };
        Ok(Self::from_parts(Arc::new(repo), pool, settings))
    }

    pub fn from_parts(repo: Arc<Repository>, pool: SqlitePool, settings: SyncSettings) -> Self {
        Self {
            organizer: Organizer::new(Arc::clone(&repo), pool.clone()),
            status: StatusStore::new(pool),
            reconciler: Reconciler::new(Arc::clone(&repo), settings),
            repo,
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub async fn list_albums(&self) -> Result<Vec<AlbumEntry>> {
        let statuses = self.status.snapshot_or_default().await;
        self.organizer.list_albums(&statuses).await
    }

    pub async fn list_notes(&self, query: &NoteQuery) -> Result<Page<NoteView>> {
        let scope = match query.album.as_deref() {
            None | Some(VIEW_ALL) => AlbumScope::All,
            Some(VIEW_DOWNLOADED) => AlbumScope::Downloaded,
            Some(VIEW_STARRED) => AlbumScope::Starred,
            Some(name) => {
                if !self.organizer.album_exists(name).await? {
                    return Err(Error::NotFound(format!("album '{}'", name)));
                }
                AlbumScope::Album {
                    name: name.to_string(),
                    linked: self.organizer.linked_ids(name).await,
                }
            }
        };
        let filter = NoteFilter {
            scope,
            note_type: query.note_type,
            learning: query.learning,
        };

        let statuses = self.status.snapshot_or_default().await;
        let page = self.repo.list(&filter, &statuses, query.page)?;
        self.into_views(page, &statuses).await
    }

    pub async fn get_note(&self, id: &str) -> Result<NoteView> {
        let record = self.repo.get(id)?;
        let status = self.status.get_or_default(id).await;
        let linked = self.organizer.albums_linking(id).await;
        Ok(self.view(record, status, linked))
    }

    pub async fn search_notes(&self, keyword: &str, request: PageRequest) -> Result<Page<NoteView>> {
        let page = self.repo.search(keyword, request)?;
        let statuses = self.status.snapshot_or_default().await;
        self.into_views(page, &statuses).await
    }

    pub async fn stats(&self) -> Result<LibraryStats> {
        let (downloaded, pending) = self.repo.counts()?;
        let album_count = self
            .list_albums()
            .await?
            .iter()
            .filter(|a| a.kind != AlbumKind::Virtual)
            .count();

        let repo = Arc::clone(&self.repo);
        let storage_bytes = tokio::task::spawn_blocking(move || repo.storage_bytes())
            .await
            .map_err(|e| Error::Internal(format!("storage scan failed: {}", e)))?;

        Ok(LibraryStats {
            downloaded_count: downloaded,
            pending_count: pending,
            total_count: downloaded + pending,
            album_count,
            storage_bytes,
            progress_pct: LibraryStats::progress(downloaded, pending),
        })
    }

    pub async fn create_album(&self, name: &str) -> Result<AlbumEntry> {
        self.organizer.create_album(name).await
    }

    pub async fn move_note(&self, id: &str, target: &str) -> Result<NoteView> {
        self.organizer.move_note(id, target).await?;
        self.get_note(id).await
    }

    pub async fn copy_note(&self, id: &str, target: &str) -> Result<NoteView> {
        self.organizer.copy_note(id, target).await?;
        self.get_note(id).await
    }

    pub async fn remove_from_album(&self, album: &str, id: &str) -> Result<()> {
        self.organizer.remove_from_album(album, id).await
    }

    pub async fn toggle_learned(&self, id: &str) -> Result<bool> {
        self.ensure_known(id)?;
        self.status.toggle_learned(id).await
    }

    pub async fn toggle_starred(&self, id: &str) -> Result<bool> {
        self.ensure_known(id)?;
        self.status.toggle_starred(id).await
    }

    fn ensure_known(&self, id: &str) -> Result<()> {
        if self.repo.is_known(id)? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("note '{}'", id)))
        }
    }

    pub fn record_listing(&self, listing: &RemoteListing) -> Result<()> {
        self.repo.record_listing(listing)
    }

    /// Record the listing, download what is new, optionally repair media
    pub async fn sync_listing(
        &self,
        listing: &RemoteListing,
        source: &dyn NoteSource,
        downloader: &dyn MediaDownloader,
        cancel: &CancellationToken,
        progress: Option<ProgressFn>,
        repair: bool,
    ) -> Result<SyncSummary> {
        self.record_listing(listing)?;

        let items = listing.items();
        let mut summary = self
            .reconciler
            .sync(&items, source, downloader, cancel, progress)
            .await?;

        if repair && !cancel.is_cancelled() {
            let repaired = self.reconciler.repair_media(downloader, cancel).await?;
            summary.absorb(repaired);
        }
        Ok(summary)
    }

    async fn into_views(
        &self,
        page: Page<NoteRecord>,
        statuses: &StatusSnapshot,
    ) -> Result<Page<NoteView>> {
        let mut links: HashMap<String, Vec<String>> = if page.items.is_empty() {
            HashMap::new()
        } else {
            self.organizer.links_by_note().await
        };

        Ok(page.map(|record| {
            let status = statuses.get(&record.note.id).copied().unwrap_or_default();
            let linked = links.remove(&record.note.id).unwrap_or_default();
            self.view(record, status, linked)
        }))
    }

    fn view(&self, record: NoteRecord, status: NoteStatus, linked_albums: Vec<String>) -> NoteView {
        let local_path = record.folder.as_ref().and_then(|folder| {
            folder
                .strip_prefix(self.repo.library_path())
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        });
        let media_refs = if record.is_downloaded() {
            record.note.media.iter().map(|m| m.file.clone()).collect()
        } else {
            Vec::new()
        };

        NoteView {
            album: record.album,
            linked_albums,
            local_path,
            media_refs,
            has_local: record.has_local,
            is_learned: status.is_learned,
            is_starred: status.is_starred,
            note: record.note,
        }
    }
}
