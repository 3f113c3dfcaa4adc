//! Filesystem helpers for the repository
//!
//! Every file that readers may observe is written to a hidden temp name in
//! the same directory and renamed into place.

use nkeep_common::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::Note;

/// Metadata file marking a note folder as persisted
pub const METADATA_FILE: &str = "metadata.json";

/// Prefix of a note folder still receiving media during sync
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Prefix of a note folder being copied by a move
pub const MOVING_PREFIX: &str = ".moving-";

/// Write `bytes` to `path` via temp file + rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Validation(format!("invalid file path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::io_context("write", path.display(), e)
    })
}

/// Atomically write a note's metadata file into `folder`
pub fn write_metadata(folder: &Path, note: &Note) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(note)?;
    write_atomic(&folder.join(METADATA_FILE), &bytes)
}

/// Read a note's metadata file from `folder`
pub fn read_metadata(folder: &Path) -> Result<Note> {
    let path = folder.join(METADATA_FILE);
    let bytes = fs::read(&path).map_err(|e| Error::io_context("read", path.display(), e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// True if `folder` holds metadata for note `id`
pub fn holds_note(folder: &Path, id: &str) -> bool {
    read_metadata(folder).map(|n| n.id == id).unwrap_or(false)
}

/// True if every media file the note references exists in `folder`
pub fn media_complete(folder: &Path, note: &Note) -> bool {
    note.media.iter().all(|m| folder.join(&m.file).is_file())
}

/// Media entries whose files are missing from `folder`
pub fn missing_media<'a>(folder: &Path, note: &'a Note) -> Vec<&'a crate::models::MediaRef> {
    note.media
        .iter()
        .filter(|m| !folder.join(&m.file).is_file())
        .collect()
}

/// Recursively copy `src` into a new directory `dst`
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::Internal(format!("walk {}: {}", src.display(), e)))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| Error::io_context("create", target.display(), e))?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| Error::io_context("copy", entry.path().display(), e))?;
        }
    }
    Ok(())
}

/// Remove a directory tree, treating "already gone" as success
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_context("remove", path.display(), e)),
    }
}

/// Visible subdirectories of `dir`, sorted by name
pub fn visible_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io_context("list", dir.display(), e)),
    };

    let mut out = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| Error::io_context("list", dir.display(), e))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 directory name");
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            out.push((name, entry.path()));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Remove leftover staging folders from interrupted syncs and moves
pub fn sweep_staging(library: &Path) -> Result<usize> {
    let mut removed = 0;
    for (_, album_dir) in visible_subdirs(library)? {
        let read = fs::read_dir(&album_dir)
            .map_err(|e| Error::io_context("list", album_dir.display(), e))?;
        for entry in read.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(PARTIAL_PREFIX) || name.starts_with(MOVING_PREFIX) {
                remove_dir_if_exists(&entry.path())?;
                tracing::info!(path = %entry.path().display(), "Removed interrupted staging folder");
                removed += 1;
            }
        }
    }
    Ok(removed)
}

/// Total size of all files below `root`
pub fn tree_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
