//! Sync session state machine
//!
//! A session runs RUNNING → COMPLETED | CANCELLED | FAILED. FAILED means the
//! batch could not run at all (e.g. the listing could not be recorded);
//! per-note failures are reported in the summary of a COMPLETED session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sync workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SyncState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncState::Running)
    }
}

/// Notes processed out of notes to fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
}

impl SyncProgress {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

/// One note that could not be synced, with the step that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub note_id: String,
    pub operation: String,
    pub message: String,
}

/// End-of-run report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Already present locally, never re-fetched
    pub skipped: usize,
    /// Not started because the run was cancelled
    pub cancelled: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncSummary {
    /// Fold another run (e.g. media repair) into this summary
    pub fn absorb(&mut self, other: SyncSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cancelled += other.cancelled;
        self.failures.extend(other.failures);
    }
}

/// In-memory sync session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub session_id: Uuid,
    pub state: SyncState,
    pub progress: SyncProgress,
    pub summary: Option<SyncSummary>,
    /// Set when the whole batch failed
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SyncSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: SyncState::Running,
            progress: SyncProgress::default(),
            summary: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to a new state; terminal states stamp the end time
    pub fn transition_to(&mut self, new_state: SyncState) {
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }
}

impl Default for SyncSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_transition_sets_end_time() {
        let mut session = SyncSession::new();
        assert!(session.ended_at.is_none());

        session.transition_to(SyncState::Completed);
        assert!(session.ended_at.is_some());
        assert!(session.state.is_terminal());
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(SyncProgress::new(0, 0).percentage, 0.0);
        assert_eq!(SyncProgress::new(1, 4).percentage, 25.0);
    }

    #[test]
    fn test_summary_absorb() {
        let mut a = SyncSummary { succeeded: 1, skipped: 2, ..Default::default() };
        a.absorb(SyncSummary {
            failed: 1,
            failures: vec![SyncFailure {
                note_id: "n".into(),
                operation: "repair_media".into(),
                message: "boom".into(),
            }],
            ..Default::default()
        });
        assert_eq!((a.succeeded, a.failed, a.skipped), (1, 1, 2));
        assert_eq!(a.failures.len(), 1);
    }
}
