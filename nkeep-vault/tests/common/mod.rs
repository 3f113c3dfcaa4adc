//! Shared fixtures: a temp library and in-process fake collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use nkeep_common::config::RootFolderInitializer;
use nkeep_common::{Error, Result};
use nkeep_vault::models::{
    Note, NoteDetail, NoteRef, RemoteAlbum, RemoteItem, RemoteListing, RemoteSummary,
};
use nkeep_vault::reconciler::SyncSettings;
use nkeep_vault::services::{MediaDownloader, NoteSource};
use nkeep_vault::Library;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub fn fast_settings(concurrency: usize) -> SyncSettings {
    SyncSettings {
        concurrency,
        request_interval: Duration::ZERO,
        media_interval: Duration::ZERO,
    }
}

pub async fn open_library(temp: &TempDir, concurrency: usize) -> Library {
    let root = RootFolderInitializer::new(temp.path().to_path_buf());
    Library::open(&root, fast_settings(concurrency)).await.unwrap()
}

pub fn item(album: &str, id: &str) -> RemoteItem {
    RemoteItem::new(album, RemoteSummary::new(id, format!("Title {}", id)))
}

pub fn listing(album: &str, ids: &[&str]) -> RemoteListing {
    RemoteListing {
        albums: vec![RemoteAlbum {
            name: album.to_string(),
            notes: ids
                .iter()
                .map(|id| RemoteSummary::new(*id, format!("Title {}", id)))
                .collect(),
        }],
    }
}

pub fn note(album: &str, id: &str, title: &str) -> Note {
    Note::from_summary(&RemoteSummary::new(id, title), album)
}

/// Detail source with scripted failures and a call log
#[derive(Default)]
pub struct FakeSource {
    pub calls: Mutex<Vec<String>>,
    pub failing: Mutex<HashSet<String>>,
    /// Cancel this token once this many fetches have been made
    pub cancel_after: Option<(usize, CancellationToken)>,
    pub images_per_note: usize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            images_per_note: 2,
            ..Self::default()
        }
    }

    pub fn failing(ids: &[&str]) -> Self {
        let source = Self::new();
        *source.failing.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
        source
    }

    pub fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NoteSource for FakeSource {
    async fn fetch_detail(&self, note: &NoteRef) -> Result<NoteDetail> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(note.id.clone());
            calls.len()
        };
        if let Some((limit, token)) = &self.cancel_after {
            if count >= *limit {
                token.cancel();
            }
        }

        if self.failing.lock().unwrap().contains(&note.id) {
            return Err(Error::TransientFetch(format!("upstream timeout for {}", note.id)));
        }

        Ok(NoteDetail {
            id: note.id.clone(),
            author: "Mia".to_string(),
            tags: vec!["pets".to_string()],
            image_urls: (0..self.images_per_note)
                .map(|i| format!("https://img.test/{}/{}.jpg", note.id, i))
                .collect(),
            ..NoteDetail::default()
        })
    }
}

/// Writes the URL as file content; URLs containing a failing marker error
#[derive(Default)]
pub struct FakeDownloader {
    pub failing_marker: Option<String>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            failing_marker: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaDownloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.downloads.lock().unwrap().push(url.to_string());
        if let Some(marker) = &self.failing_marker {
            if url.contains(marker.as_str()) {
                return Err(Error::TransientFetch(format!("download {} reset", url)));
            }
        }
        std::fs::write(dest, url.as_bytes())?;
        Ok(url.len() as u64)
    }
}

/// Visible note folders below `library/<album>`
pub fn note_folders(library: &Path, album: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(library.join(album))
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
