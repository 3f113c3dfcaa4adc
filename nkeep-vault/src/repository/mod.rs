//! Local content repository
//!
//! Notes live at `<library>/<album>/<title>_<id>/metadata.json` with their
//! media files alongside. The filesystem is the source of truth: the
//! in-memory index is built lazily from a directory scan and kept current by
//! the repository's own writes. Notes seen in the last remote listing but not
//! yet downloaded are merged in as listing-only records.

mod fs;
mod staging;

pub use fs::{
    copy_dir, media_complete, missing_media, remove_dir_if_exists, write_atomic, METADATA_FILE,
};
pub use staging::StagedNote;

use nkeep_common::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::naming::{
    note_folder_name, sanitize_segment, storage_album_name, validate_note_id,
};
use crate::models::{LearningFilter, Note, NoteType, RemoteListing, StatusSnapshot};
use crate::pagination::{Page, PageRequest};

/// A note with its placement
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRecord {
    pub note: Note,
    /// Album the note is primary-located in
    pub album: String,
    /// Note folder, `None` for listing-only notes
    pub folder: Option<PathBuf>,
    /// Metadata and every referenced media file are on disk
    pub has_local: bool,
}

impl NoteRecord {
    pub fn is_downloaded(&self) -> bool {
        self.folder.is_some()
    }
}

/// Which album (or virtual view) a listing covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AlbumScope {
    /// Every known note, downloaded or not
    #[default]
    All,
    Downloaded,
    Starred,
    /// Notes located in the album plus notes linked into it
    Album { name: String, linked: HashSet<String> },
}

/// Listing filter
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    pub scope: AlbumScope,
    pub note_type: Option<NoteType>,
    pub learning: Option<LearningFilter>,
}

impl NoteFilter {
    fn accepts(&self, record: &NoteRecord, statuses: &StatusSnapshot) -> bool {
        let status = statuses.get(&record.note.id).copied().unwrap_or_default();

        let in_scope = match &self.scope {
            AlbumScope::All => true,
            AlbumScope::Downloaded => record.is_downloaded(),
            AlbumScope::Starred => status.is_starred,
            AlbumScope::Album { name, linked } => {
                &record.album == name || linked.contains(&record.note.id)
            }
        };

        in_scope
            && self.note_type.map_or(true, |t| record.note.note_type == t)
            && self.learning.map_or(true, |l| l.accepts(status))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    note: Note,
    album: String,
    folder: PathBuf,
    has_local: bool,
}

#[derive(Debug, Clone)]
struct ListingEntry {
    album: String,
    note: Note,
}

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<String, Entry>,
    /// Listing order, duplicates removed
    listing: Vec<ListingEntry>,
    /// Position of each id in `listing`
    listed: HashMap<String, usize>,
}

impl Index {
    fn set_listing(&mut self, listing: Vec<ListingEntry>) {
        self.listed = listing
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.note.id.clone(), pos))
            .collect();
        self.listing = listing;
    }

    fn listing_entry(&self, id: &str) -> Option<&ListingEntry> {
        self.listed.get(id).and_then(|&pos| self.listing.get(pos))
    }

    fn record(&self, id: &str) -> Option<NoteRecord> {
        if let Some(entry) = self.entries.get(id) {
            return Some(entry_record(entry));
        }
        self.listing_entry(id).map(listing_record)
    }

    /// Downloaded notes newest first (ties by id), then listing-only notes
    /// in listing order
    fn sorted_records(&self) -> Vec<NoteRecord> {
        let mut downloaded: Vec<&Entry> = self.entries.values().collect();
        downloaded.sort_by(|a, b| {
            b.note
                .scraped_at
                .cmp(&a.note.scraped_at)
                .then_with(|| a.note.id.cmp(&b.note.id))
        });

        let mut out: Vec<NoteRecord> = downloaded.into_iter().map(entry_record).collect();
        out.extend(
            self.listing
                .iter()
                .filter(|l| !self.entries.contains_key(&l.note.id))
                .map(listing_record),
        );
        out
    }
}

fn entry_record(entry: &Entry) -> NoteRecord {
    NoteRecord {
        note: entry.note.clone(),
        album: entry.album.clone(),
        folder: Some(entry.folder.clone()),
        has_local: entry.has_local,
    }
}

fn listing_record(entry: &ListingEntry) -> NoteRecord {
    NoteRecord {
        note: entry.note.clone(),
        album: entry.album.clone(),
        folder: None,
        has_local: false,
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Internal("repository index lock poisoned".to_string())
}

/// Album names must already be a single safe path segment
fn ensure_album_segment(album: &str) -> Result<()> {
    if album.is_empty() || album.starts_with('.') || sanitize_segment(album) != album {
        return Err(Error::Validation(format!(
            "album '{}' is not a valid folder name",
            album
        )));
    }
    Ok(())
}

/// Filesystem-backed note store
pub struct Repository {
    library: PathBuf,
    listing_path: PathBuf,
    index: RwLock<Option<Index>>,
}

impl Repository {
    /// Open a library directory, creating it if needed
    ///
    /// Staging folders left behind by an interrupted sync or move are
    /// removed here; the index itself is built on first access.
    pub fn open(library: impl Into<PathBuf>, listing_path: impl Into<PathBuf>) -> Result<Self> {
        let library = library.into();
        std::fs::create_dir_all(&library)
            .map_err(|e| Error::io_context("create", library.display(), e))?;

        let swept = fs::sweep_staging(&library)?;
        if swept > 0 {
            info!(count = swept, "Cleaned up interrupted staging folders");
        }

        Ok(Self {
            library,
            listing_path: listing_path.into(),
            index: RwLock::new(None),
        })
    }

    pub fn library_path(&self) -> &Path {
        &self.library
    }

    /// Drop the index so the next access rescans the disk
    pub fn invalidate(&self) -> Result<()> {
        *self.index.write().map_err(poisoned)? = None;
        Ok(())
    }

    fn read_index<R>(&self, f: impl FnOnce(&Index) -> R) -> Result<R> {
        {
            let guard = self.index.read().map_err(poisoned)?;
            if let Some(index) = guard.as_ref() {
                return Ok(f(index));
            }
        }
        self.write_index(|index| f(index))
    }

    fn write_index<R>(&self, f: impl FnOnce(&mut Index) -> R) -> Result<R> {
        let mut guard = self.index.write().map_err(poisoned)?;
        if guard.is_none() {
            *guard = Some(self.build_index()?);
        }
        match guard.as_mut() {
            Some(index) => Ok(f(index)),
            None => Err(Error::Internal("repository index missing".to_string())),
        }
    }

    fn build_index(&self) -> Result<Index> {
        let mut index = Index::default();

        for (album, album_dir) in fs::visible_subdirs(&self.library)? {
            for (_, folder) in fs::visible_subdirs(&album_dir)? {
                if !folder.join(METADATA_FILE).is_file() {
                    continue;
                }
                let note = match fs::read_metadata(&folder) {
                    Ok(note) => note,
                    Err(e) => {
                        warn!(path = %folder.display(), error = %e, "Skipping unreadable note metadata");
                        continue;
                    }
                };
                if let Err(e) = validate_note_id(&note.id) {
                    warn!(path = %folder.display(), error = %e, "Skipping note with invalid id");
                    continue;
                }
                if let Some(existing) = index.entries.get(&note.id) {
                    warn!(
                        note_id = %note.id,
                        kept = %existing.folder.display(),
                        ignored = %folder.display(),
                        "Duplicate note id on disk"
                    );
                    continue;
                }

                let has_local = media_complete(&folder, &note);
                index.entries.insert(
                    note.id.clone(),
                    Entry {
                        note,
                        album: album.clone(),
                        folder,
                        has_local,
                    },
                );
            }
        }

        if let Some(listing) = self.load_listing()? {
            index.set_listing(listing_entries(&listing));
        }

        debug!(
            downloaded = index.entries.len(),
            listed = index.listing.len(),
            "Built repository index"
        );
        Ok(index)
    }

    fn load_listing(&self) -> Result<Option<RemoteListing>> {
        let bytes = match std::fs::read(&self.listing_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_context("read", self.listing_path.display(), e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(listing) => Ok(Some(listing)),
            Err(e) => {
                warn!(path = %self.listing_path.display(), error = %e, "Ignoring unreadable listing snapshot");
                Ok(None)
            }
        }
    }

    /// True if the note has been persisted locally (metadata exists)
    pub fn contains(&self, id: &str) -> Result<bool> {
        self.read_index(|index| index.entries.contains_key(id))
    }

    /// True if the note is downloaded or present in the listing snapshot
    pub fn is_known(&self, id: &str) -> Result<bool> {
        self.read_index(|index| {
            index.entries.contains_key(id) || index.listed.contains_key(id)
        })
    }

    /// Look up one note; `has_local` is rechecked against the disk
    pub fn get(&self, id: &str) -> Result<NoteRecord> {
        let mut record = self
            .read_index(|index| index.record(id))?
            .ok_or_else(|| Error::NotFound(format!("note '{}'", id)))?;
        if let Some(folder) = &record.folder {
            record.has_local = media_complete(folder, &record.note);
        }
        Ok(record)
    }

    /// Filtered listing in the default order
    pub fn list(
        &self,
        filter: &NoteFilter,
        statuses: &StatusSnapshot,
        request: PageRequest,
    ) -> Result<Page<NoteRecord>> {
        let matching: Vec<NoteRecord> = self
            .read_index(|index| index.sorted_records())?
            .into_iter()
            .filter(|r| filter.accepts(r, statuses))
            .collect();
        Ok(Page::from_sorted(matching, request))
    }

    /// Case-insensitive keyword search over title, author and tags
    pub fn search(&self, keyword: &str, request: PageRequest) -> Result<Page<NoteRecord>> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::Validation("search keyword must not be empty".to_string()));
        }

        let matching: Vec<NoteRecord> = self
            .read_index(|index| index.sorted_records())?
            .into_iter()
            .filter(|r| r.note.matches_keyword(&needle))
            .collect();
        Ok(Page::from_sorted(matching, request))
    }

    /// Persist a note's metadata
    ///
    /// Idempotent: an already stored note is rewritten in place and keeps its
    /// album, so `put` never creates a second copy.
    pub fn put(&self, album: &str, note: &Note) -> Result<NoteRecord> {
        validate_note_id(&note.id)?;
        ensure_album_segment(album)?;

        let mut note = note.clone();
        note.scraped_at.get_or_insert_with(chrono::Utc::now);

        let existing = self.read_index(|index| {
            index
                .entries
                .get(&note.id)
                .map(|e| (e.album.clone(), e.folder.clone()))
        })?;
        let (album, folder) = existing.unwrap_or_else(|| {
            (
                album.to_string(),
                self.library
                    .join(album)
                    .join(note_folder_name(&note.title, &note.id)),
            )
        });

        std::fs::create_dir_all(&folder)
            .map_err(|e| Error::io_context("create", folder.display(), e))?;
        fs::write_metadata(&folder, &note)?;

        let entry = Entry {
            has_local: media_complete(&folder, &note),
            note,
            album,
            folder,
        };
        let record = entry_record(&entry);
        self.write_index(|index| index.entries.insert(record.note.id.clone(), entry))?;
        Ok(record)
    }

    /// Open a hidden staging folder for a note that is not stored yet
    pub fn stage(&self, album: &str, note: Note) -> Result<StagedNote> {
        validate_note_id(&note.id)?;
        ensure_album_segment(album)?;
        if self.contains(&note.id)? {
            return Err(Error::Conflict(format!("note '{}' is already stored", note.id)));
        }

        let album_dir = self.library.join(album);
        let folder_name = note_folder_name(&note.title, &note.id);
        let staging = album_dir.join(format!("{}{}", fs::PARTIAL_PREFIX, folder_name));
        let target = album_dir.join(&folder_name);

        fs::remove_dir_if_exists(&staging)?;
        std::fs::create_dir_all(&staging)
            .map_err(|e| Error::io_context("create", staging.display(), e))?;

        Ok(StagedNote {
            note,
            album: album.to_string(),
            staging,
            target,
            committed: false,
        })
    }

    /// Publish a staged note: metadata last, then one rename into place
    ///
    /// Every referenced media file must already be in the staging folder.
    pub fn commit(&self, mut staged: StagedNote) -> Result<NoteRecord> {
        let missing: Vec<String> = fs::missing_media(&staged.staging, &staged.note)
            .into_iter()
            .map(|m| m.file.clone())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "note '{}' is missing media: {}",
                staged.note.id,
                missing.join(", ")
            )));
        }

        fs::write_metadata(&staged.staging, &staged.note)?;

        // A folder without readable metadata at the target is debris from
        // an older layout or a manual copy
        if staged.target.exists() {
            warn!(path = %staged.target.display(), "Replacing incomplete note folder");
            fs::remove_dir_if_exists(&staged.target)?;
        }
        std::fs::rename(&staged.staging, &staged.target)
            .map_err(|e| Error::io_context("rename", staged.staging.display(), e))?;
        staged.committed = true;

        let entry = Entry {
            note: staged.note.clone(),
            album: staged.album.clone(),
            folder: staged.target.clone(),
            has_local: true,
        };
        let record = entry_record(&entry);
        self.write_index(|index| index.entries.insert(entry.note.id.clone(), entry))?;
        Ok(record)
    }

    /// Re-read a stored note from disk after its media changed
    pub fn refresh_note(&self, id: &str) -> Result<NoteRecord> {
        let folder = self
            .read_index(|index| index.entries.get(id).map(|e| e.folder.clone()))?
            .ok_or_else(|| Error::NotFound(format!("note '{}'", id)))?;
        let note = fs::read_metadata(&folder)?;
        let has_local = media_complete(&folder, &note);

        self.write_index(|index| {
            index.entries.get_mut(id).map(|entry| {
                entry.note = note;
                entry.has_local = has_local;
                entry_record(entry)
            })
        })?
        .ok_or_else(|| Error::NotFound(format!("note '{}'", id)))
    }

    /// Physically move a stored note folder into another album
    ///
    /// The folder is copied to a hidden name in the target album, renamed
    /// into place, and only then removed from the source. A destination that
    /// already holds this note (an earlier move that died before cleanup) is
    /// reused.
    pub fn relocate(&self, id: &str, target_album: &str) -> Result<NoteRecord> {
        ensure_album_segment(target_album)?;

        let (album, source) = self
            .read_index(|index| {
                index
                    .entries
                    .get(id)
                    .map(|e| (e.album.clone(), e.folder.clone()))
            })?
            .ok_or_else(|| Error::NotFound(format!("note '{}' is not stored locally", id)))?;

        if album == target_album {
            return self.get(id);
        }

        let folder_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Internal(format!("bad note folder {}", source.display())))?;

        let target_dir = self.library.join(target_album);
        std::fs::create_dir_all(&target_dir)
            .map_err(|e| Error::io_context("create", target_dir.display(), e))?;
        let dest = target_dir.join(&folder_name);

        if !fs::holds_note(&dest, id) {
            fs::remove_dir_if_exists(&dest)?;
            let tmp = target_dir.join(format!("{}{}", fs::MOVING_PREFIX, folder_name));
            fs::remove_dir_if_exists(&tmp)?;

            if let Err(e) = copy_dir(&source, &tmp) {
                let _ = fs::remove_dir_if_exists(&tmp);
                return Err(e);
            }
            std::fs::rename(&tmp, &dest)
                .map_err(|e| Error::io_context("rename", tmp.display(), e))?;
        }

        let record = self
            .write_index(|index| {
                index.entries.get_mut(id).map(|entry| {
                    entry.album = target_album.to_string();
                    entry.folder = dest.clone();
                    entry_record(entry)
                })
            })?
            .ok_or_else(|| Error::NotFound(format!("note '{}'", id)))?;

        fs::remove_dir_if_exists(&source)?;
        info!(note_id = %id, from = %album, to = %target_album, "Moved note");
        Ok(record)
    }

    /// Store the latest remote listing so undownloaded notes stay visible
    pub fn record_listing(&self, listing: &RemoteListing) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(listing)?;
        if let Some(parent) = self.listing_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io_context("create", parent.display(), e))?;
        }
        write_atomic(&self.listing_path, &bytes)?;

        let entries = listing_entries(listing);
        self.write_index(|index| index.set_listing(entries))?;
        Ok(())
    }

    /// Album directories present on disk
    pub fn album_dirs(&self) -> Result<Vec<String>> {
        Ok(fs::visible_subdirs(&self.library)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Remote album names from the listing snapshot, mapped to storage names
    pub fn listed_albums(&self) -> Result<Vec<String>> {
        self.read_index(|index| {
            let mut names: Vec<String> = Vec::new();
            for entry in &index.listing {
                if !names.contains(&entry.album) {
                    names.push(entry.album.clone());
                }
            }
            names
        })
    }

    /// Notes primary-located per album, listing-only notes included
    pub fn primary_counts(&self) -> Result<HashMap<String, usize>> {
        self.read_index(|index| {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for entry in index.entries.values() {
                *counts.entry(entry.album.clone()).or_default() += 1;
            }
            for entry in &index.listing {
                if !index.entries.contains_key(&entry.note.id) {
                    *counts.entry(entry.album.clone()).or_default() += 1;
                }
            }
            counts
        })
    }

    /// (downloaded, pending) counts
    pub fn counts(&self) -> Result<(usize, usize)> {
        self.read_index(|index| {
            let downloaded = index.entries.len();
            let pending = index
                .listing
                .iter()
                .filter(|l| !index.entries.contains_key(&l.note.id))
                .count();
            (downloaded, pending)
        })
    }

    /// Stored notes whose media is incomplete on disk
    pub fn incomplete_notes(&self) -> Result<Vec<NoteRecord>> {
        let mut stored: Vec<NoteRecord> = self.read_index(|index| {
            index.entries.values().map(entry_record).collect::<Vec<_>>()
        })?;
        stored.retain(|r| {
            r.folder
                .as_ref()
                .map_or(false, |folder| !media_complete(folder, &r.note))
        });
        stored.sort_by(|a, b| a.note.id.cmp(&b.note.id));
        Ok(stored)
    }

    /// Bytes used by the library on disk
    pub fn storage_bytes(&self) -> u64 {
        fs::tree_size(&self.library)
    }
}

/// Listing entries in order, first occurrence of each id wins
fn listing_entries(listing: &RemoteListing) -> Vec<ListingEntry> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in listing.items() {
        let album = storage_album_name(&item.album);
        let note = Note::from_summary(&item.summary, &item.album);
        if validate_note_id(&note.id).is_err() {
            warn!(raw_id = %item.summary.id, "Skipping listing entry with invalid id");
            continue;
        }
        if !seen.insert(note.id.clone()) {
            debug!(note_id = %note.id, "Duplicate listing entry ignored");
            continue;
        }
        out.push(ListingEntry { album, note });
    }
    out
}
