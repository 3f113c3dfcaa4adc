//! Background sync sessions
//!
//! At most one sync runs at a time. The last session stays readable after it
//! ends so clients can collect the summary.

use nkeep_common::{Error, Result};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::library::Library;
use crate::models::{RemoteListing, SyncSession, SyncState};
use crate::reconciler::ProgressFn;
use crate::services::{MediaDownloader, NoteSource};

#[derive(Default)]
pub struct SyncManager {
    session: Arc<Mutex<Option<SyncSession>>>,
    cancel_token: Mutex<Option<CancellationToken>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

fn poisoned<T>(_: T) -> Error {
    Error::Internal("sync session lock poisoned".to_string())
}

impl SyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a sync in the background; `Conflict` if one is already running
    pub async fn start(
        &self,
        library: Arc<Library>,
        source: Arc<dyn NoteSource>,
        downloader: Arc<dyn MediaDownloader>,
        listing: RemoteListing,
        repair: bool,
    ) -> Result<SyncSession> {
        let token = CancellationToken::new();
        let session = {
            let mut guard = self.session.lock().map_err(poisoned)?;
            if let Some(current) = guard.as_ref() {
                if current.state == SyncState::Running {
                    return Err(Error::Conflict(format!(
                        "sync session {} is already running",
                        current.session_id
                    )));
                }
            }
            let session = SyncSession::new();
            *guard = Some(session.clone());
            session
        };
        *self.cancel_token.lock().map_err(poisoned)? = Some(token.clone());

        info!(session_id = %session.session_id, repair, "Sync session started");

        let state = Arc::clone(&self.session);
        let progress_state = Arc::clone(&self.session);
        let progress: ProgressFn = Arc::new(move |p| {
            if let Ok(mut guard) = progress_state.lock() {
                if let Some(session) = guard.as_mut() {
                    session.progress = p;
                }
            }
        });

        let handle = tokio::spawn(async move {
            let result = library
                .sync_listing(
                    &listing,
                    source.as_ref(),
                    downloader.as_ref(),
                    &token,
                    Some(progress),
                    repair,
                )
                .await;

            let Ok(mut guard) = state.lock() else {
                error!("Sync session lock poisoned; result dropped");
                return;
            };
            let Some(session) = guard.as_mut() else {
                return;
            };
            match result {
                Ok(summary) => {
                    session.summary = Some(summary);
                    if token.is_cancelled() {
                        session.transition_to(SyncState::Cancelled);
                    } else {
                        session.transition_to(SyncState::Completed);
                    }
                    info!(session_id = %session.session_id, state = ?session.state, "Sync session ended");
                }
                Err(e) => {
                    error!(session_id = %session.session_id, error = %e, "Sync session failed");
                    session.error = Some(e.to_string());
                    session.transition_to(SyncState::Failed);
                }
            }
        });
        *self.task.lock().await = Some(handle);

        Ok(session)
    }

    /// Current or most recent session
    pub fn status(&self) -> Result<Option<SyncSession>> {
        Ok(self.session.lock().map_err(poisoned)?.clone())
    }

    /// Ask the running session to stop after the notes in flight
    pub fn cancel(&self) -> Result<SyncSession> {
        let session = self
            .status()?
            .filter(|s| s.state == SyncState::Running)
            .ok_or_else(|| Error::NotFound("no sync session is running".to_string()))?;

        if let Some(token) = self.cancel_token.lock().map_err(poisoned)?.as_ref() {
            token.cancel();
        }
        info!(session_id = %session.session_id, "Sync cancellation requested");
        Ok(session)
    }

    /// Wait for the background task of the latest session to finish
    pub async fn wait(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Sync task panicked");
            }
        }
    }
}
