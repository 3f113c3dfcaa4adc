//! External collaborators and pacing

pub mod media_downloader;
pub mod note_source;
pub mod rate_limiter;

pub use media_downloader::{HttpMediaDownloader, MediaDownloader};
pub use note_source::{HttpNoteSource, NoteSource};
pub use rate_limiter::RequestPacer;
