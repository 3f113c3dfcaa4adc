//! Album organizer: custom albums, moves and copies
//!
//! A note has exactly one primary album, which is where its folder lives.
//! Copies are link rows pointing at the same note id, so metadata and
//! overlay flags stay shared between every view of the note.

use nkeep_common::{is_reserved_album_name, Error, Result, VIEW_ALL, VIEW_DOWNLOADED, VIEW_STARRED};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::db::albums;
use crate::models::naming::validate_album_name;
use crate::models::{AlbumEntry, AlbumKind, StatusSnapshot};
use crate::pagination::PageRequest;
use crate::repository::{AlbumScope, NoteFilter, NoteRecord, Repository};

/// Per-note async locks serializing moves and copies of the same note
#[derive(Default)]
pub struct ItemLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ItemLocks {
    pub async fn acquire(&self, id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .map_err(|_| Error::Internal("item lock table poisoned".to_string()))?;
            // Entries nobody holds any more
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(id.to_string()).or_default())
        };
        Ok(lock.lock_owned().await)
    }
}

pub struct Organizer {
    repo: Arc<Repository>,
    pool: SqlitePool,
    locks: ItemLocks,
}

impl Organizer {
    pub fn new(repo: Arc<Repository>, pool: SqlitePool) -> Self {
        Self {
            repo,
            pool,
            locks: ItemLocks::default(),
        }
    }

    /// Register a custom album
    ///
    /// Fails with `Conflict` if the name is a virtual view or any existing
    /// album (remote or custom, exact match).
    pub async fn create_album(&self, name: &str) -> Result<AlbumEntry> {
        validate_album_name(name)?;

        if self.remote_album_exists(name)? {
            return Err(Error::Conflict(format!("album '{}' already exists", name)));
        }
        if !albums::insert_album(&self.pool, name).await? {
            return Err(Error::Conflict(format!("album '{}' already exists", name)));
        }

        let dir = self.repo.library_path().join(name);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io_context("create", dir.display(), e))?;

        info!(album = %name, "Created album");
        Ok(AlbumEntry {
            name: name.to_string(),
            kind: AlbumKind::Custom,
            count: 0,
            linked: 0,
        })
    }

    fn remote_album_exists(&self, name: &str) -> Result<bool> {
        Ok(self.repo.album_dirs()?.iter().any(|d| d == name)
            || self.repo.listed_albums()?.iter().any(|a| a == name))
    }

    /// True for any album a note can be placed in
    ///
    /// With the registry unreadable only remote albums are found.
    pub async fn album_exists(&self, name: &str) -> Result<bool> {
        if self.remote_album_exists(name)? {
            return Ok(true);
        }
        Ok(or_empty(albums::album_exists(&self.pool, name).await, "album registry"))
    }

    async fn check_target(&self, target: &str) -> Result<()> {
        if is_reserved_album_name(target) {
            return Err(Error::Validation(format!(
                "'{}' is a built-in view, not an album",
                target
            )));
        }
        if !self.album_exists(target).await? {
            return Err(Error::NotFound(format!("album '{}'", target)));
        }
        Ok(())
    }

    /// Make `target` the note's only primary album
    ///
    /// The folder is copied before the source is removed, so an interrupted
    /// move leaves the note readable from at least one album.
    pub async fn move_note(&self, id: &str, target: &str) -> Result<NoteRecord> {
        self.check_target(target).await?;
        let _guard = self.locks.acquire(id).await?;

        let record = self.repo.get(id)?;
        if !record.is_downloaded() {
            return Err(Error::Validation(format!(
                "note '{}' has not been downloaded yet and cannot be moved",
                id
            )));
        }
        if record.album == target {
            return Ok(record);
        }

        let repo = Arc::clone(&self.repo);
        let (note_id, album) = (id.to_string(), target.to_string());
        let moved = tokio::task::spawn_blocking(move || repo.relocate(&note_id, &album))
            .await
            .map_err(|e| Error::Internal(format!("move task failed: {}", e)))??;

        // A link into the new primary album is now redundant
        albums::remove_link(&self.pool, target, id).await?;
        Ok(moved)
    }

    /// Add the note to `target` without removing it from its primary album
    ///
    /// `Conflict` if the note is already in `target`, as primary or copy.
    pub async fn copy_note(&self, id: &str, target: &str) -> Result<NoteRecord> {
        self.check_target(target).await?;
        let _guard = self.locks.acquire(id).await?;

        let record = self.repo.get(id)?;
        if record.album == target || !albums::add_link(&self.pool, target, id).await? {
            return Err(Error::Conflict(format!(
                "note '{}' is already in album '{}'",
                id, target
            )));
        }
        info!(note_id = %id, album = %target, "Copied note into album");
        Ok(record)
    }

    /// Drop a copy of a note from an album
    ///
    /// A note's primary album cannot be removed this way; move it instead.
    pub async fn remove_from_album(&self, album: &str, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await?;

        let record = self.repo.get(id)?;
        if record.album == album {
            return Err(Error::Validation(format!(
                "'{}' is the primary album of note '{}'; move the note instead",
                album, id
            )));
        }
        if !albums::remove_link(&self.pool, album, id).await? {
            return Err(Error::NotFound(format!("note '{}' in album '{}'", id, album)));
        }
        Ok(())
    }

    // Link lookups feed read paths only; an unreadable store reads as no copies

    /// Ids linked into an album, for album-scoped listings
    pub async fn linked_ids(&self, album: &str) -> HashSet<String> {
        or_empty(albums::linked_ids(&self.pool, album).await, "copy links")
    }

    pub async fn links_by_note(&self) -> HashMap<String, Vec<String>> {
        or_empty(albums::links_by_note(&self.pool).await, "copy links")
    }

    pub async fn albums_linking(&self, id: &str) -> Vec<String> {
        or_empty(albums::albums_linking(&self.pool, id).await, "copy links")
    }

    /// Virtual views first, then remote albums by name, then custom albums
    /// in creation order. Counts are computed on every call.
    pub async fn list_albums(&self, statuses: &StatusSnapshot) -> Result<Vec<AlbumEntry>> {
        let (downloaded, pending) = self.repo.counts()?;
        let starred = self
            .repo
            .list(
                &NoteFilter {
                    scope: AlbumScope::Starred,
                    ..Default::default()
                },
                statuses,
                PageRequest::new(1, 1),
            )?
            .total;

        let mut entries = vec![
            virtual_entry(VIEW_ALL, downloaded + pending),
            virtual_entry(VIEW_DOWNLOADED, downloaded),
            virtual_entry(VIEW_STARRED, starred),
        ];

        let custom = or_empty(albums::load_album_names(&self.pool).await, "album registry");
        let primary = self.repo.primary_counts()?;
        let links = or_empty(albums::link_counts(&self.pool).await, "copy links");

        let mut remote: Vec<String> = self.repo.album_dirs()?;
        for listed in self.repo.listed_albums()? {
            if !remote.contains(&listed) {
                remote.push(listed);
            }
        }
        remote.retain(|name| !custom.contains(name));
        remote.sort();

        let placed = remote
            .into_iter()
            .map(|name| (name, AlbumKind::Remote))
            .chain(custom.into_iter().map(|name| (name, AlbumKind::Custom)));
        for (name, kind) in placed {
            entries.push(AlbumEntry {
                count: primary.get(&name).copied().unwrap_or(0),
                linked: links.get(&name).copied().unwrap_or(0),
                name,
                kind,
            });
        }

        Ok(entries)
    }
}

fn or_empty<T: Default>(result: Result<T>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!(error = %e, "{} unreadable, treating as empty", what);
        T::default()
    })
}

fn virtual_entry(name: &str, count: usize) -> AlbumEntry {
    AlbumEntry {
        name: name.to_string(),
        kind: AlbumKind::Virtual,
        count,
        linked: 0,
    }
}
