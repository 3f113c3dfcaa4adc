//! Status overlay: learned and starred flags, kept apart from note metadata

use nkeep_common::Result;
use sqlx::SqlitePool;
use tracing::warn;

use crate::db::status::{self, StatusFlag};
use crate::models::{NoteStatus, StatusSnapshot};

/// Overlay store
///
/// Each toggle is one atomic upsert, so concurrent toggles of the same note
/// serialize in SQLite and the last write wins.
#[derive(Clone)]
pub struct StatusStore {
    pool: SqlitePool,
}

impl StatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Flip the learned flag; returns the new value
    pub async fn toggle_learned(&self, note_id: &str) -> Result<bool> {
        status::toggle(&self.pool, note_id, StatusFlag::Learned).await
    }

    /// Flip the starred flag; returns the new value
    pub async fn toggle_starred(&self, note_id: &str) -> Result<bool> {
        status::toggle(&self.pool, note_id, StatusFlag::Starred).await
    }

    pub async fn get(&self, note_id: &str) -> Result<NoteStatus> {
        status::load_status(&self.pool, note_id).await
    }

    pub async fn snapshot(&self) -> Result<StatusSnapshot> {
        status::load_all(&self.pool).await
    }

    /// Snapshot for read paths: an unreadable overlay means "no flags set"
    /// rather than a failed listing
    pub async fn snapshot_or_default(&self) -> StatusSnapshot {
        match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Status overlay unreadable, treating all flags as false");
                StatusSnapshot::new()
            }
        }
    }

    /// Single-note variant of [`Self::snapshot_or_default`]
    pub async fn get_or_default(&self, note_id: &str) -> NoteStatus {
        match self.get(note_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(note_id = %note_id, error = %e, "Status overlay unreadable");
                NoteStatus::default()
            }
        }
    }
}
