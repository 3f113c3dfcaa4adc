//! Data model: notes, albums, overlay status and sync sessions

pub mod naming;
pub mod note;
pub mod sync_session;
pub mod views;

pub use note::{
    normalize_tags, parse_count, parse_note_ref, Engagement, MediaRef, Note, NoteDetail,
    NoteRef, NoteType, RemoteAlbum, RemoteItem, RemoteListing, RemoteSummary,
};
pub use sync_session::{SyncFailure, SyncProgress, SyncSession, SyncState, SyncSummary};
pub use views::{
    AlbumEntry, AlbumKind, LearningFilter, LibraryStats, NoteStatus, NoteView, StatusSnapshot,
};
