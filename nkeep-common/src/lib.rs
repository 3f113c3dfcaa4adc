//! # NoteKeep Common Library
//!
//! Shared code for the NoteKeep crates:
//! - Error taxonomy used by every repository, organizer and sync operation
//! - Configuration loading and root folder resolution
//! - Reserved album names shared by storage and presentation

pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Virtual view listing every known note
pub const VIEW_ALL: &str = "全部笔记";

/// Virtual view listing notes with a complete local copy
pub const VIEW_DOWNLOADED: &str = "已下载";

/// Virtual view listing starred notes
pub const VIEW_STARRED: &str = "星标";

/// Album names that belong to virtual views and can never name a real album
pub const RESERVED_ALBUM_NAMES: [&str; 3] = [VIEW_ALL, VIEW_DOWNLOADED, VIEW_STARRED];

/// True if `name` collides with a virtual view
pub fn is_reserved_album_name(name: &str) -> bool {
    RESERVED_ALBUM_NAMES.contains(&name)
}
