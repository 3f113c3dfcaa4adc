//! Staging folders for notes that are still receiving media

use std::path::{Path, PathBuf};

use crate::models::{MediaRef, Note};

/// A note folder under construction at `<album>/.partial-<folder>`
///
/// Invisible to listings until committed. Dropping an uncommitted stage
/// removes the folder, so a failed download leaves nothing behind.
#[derive(Debug)]
pub struct StagedNote {
    pub(super) note: Note,
    pub(super) album: String,
    pub(super) staging: PathBuf,
    pub(super) target: PathBuf,
    pub(super) committed: bool,
}

impl StagedNote {
    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    /// Staging directory media should be written into
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Where a media file lands inside the staging directory
    pub fn media_path(&self, media: &MediaRef) -> PathBuf {
        self.staging.join(&media.file)
    }
}

impl Drop for StagedNote {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_dir_all(&self.staging) {
            Ok(()) => {
                tracing::debug!(note_id = %self.note.id, "Discarded staging folder");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    note_id = %self.note.id,
                    path = %self.staging.display(),
                    error = %e,
                    "Failed to discard staging folder"
                );
            }
        }
    }
}
