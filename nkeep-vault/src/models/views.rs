//! Read models served to the presentation layer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::note::Note;

/// User-only annotations of a note; absent means both flags false
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteStatus {
    pub is_learned: bool,
    pub is_starred: bool,
}

/// Point-in-time copy of the overlay store, keyed by note id
pub type StatusSnapshot = HashMap<String, NoteStatus>;

/// Learning-status filter for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningFilter {
    Learned,
    Unlearned,
}

impl LearningFilter {
    pub fn accepts(self, status: NoteStatus) -> bool {
        match self {
            LearningFilter::Learned => status.is_learned,
            LearningFilter::Unlearned => !status.is_learned,
        }
    }
}

/// A note as the UI sees it: metadata, placement and overlay flags
#[derive(Debug, Clone, Serialize)]
pub struct NoteView {
    #[serde(flatten)]
    pub note: Note,
    /// Album the note is primary-located in
    pub album: String,
    /// Custom albums holding a copy of this note
    pub linked_albums: Vec<String>,
    /// `<album>/<folder>` below the library root, once downloaded
    pub local_path: Option<String>,
    pub media_refs: Vec<String>,
    pub has_local: bool,
    pub is_learned: bool,
    pub is_starred: bool,
}

/// Origin of an album entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumKind {
    /// Mirrors a remote collection
    Remote,
    /// Created by the user
    Custom,
    /// All / Downloaded / Starred
    Virtual,
}

/// Row of the album list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumEntry {
    pub name: String,
    pub kind: AlbumKind,
    /// Notes primary-located in this album, computed live
    pub count: usize,
    /// Copies linked into this album
    pub linked: usize,
}

/// Library-wide counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryStats {
    pub downloaded_count: usize,
    pub pending_count: usize,
    pub total_count: usize,
    pub album_count: usize,
    pub storage_bytes: u64,
    /// Downloaded share of all known notes, one decimal place
    pub progress_pct: f64,
}

impl LibraryStats {
    pub fn progress(downloaded: usize, pending: usize) -> f64 {
        let total = downloaded + pending;
        if total == 0 {
            return 0.0;
        }
        (downloaded as f64 / total as f64 * 1000.0).round() / 10.0
    }
}
