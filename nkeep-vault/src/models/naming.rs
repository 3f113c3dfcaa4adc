//! Storage naming rules
//!
//! Album names double as directory names and note folders are named
//! `<title>_<id>`. Folder names are a storage convenience; the note id
//! inside `metadata.json` is the only identity.

use nkeep_common::{is_reserved_album_name, Error, Result};

/// Characters never allowed in a path segment
const UNSAFE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\n', '\r', '\t'];

/// Longest segment kept after sanitizing (in characters)
pub const MAX_SEGMENT_CHARS: usize = 80;

/// Segment used when a title sanitizes to nothing
const UNTITLED: &str = "untitled";

/// Replace unsafe characters with `_`, trim spaces and dots, cap the length
pub fn sanitize_segment(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    let capped: String = trimmed.chars().take(MAX_SEGMENT_CHARS).collect();

    // Truncation may expose trailing spaces or dots again
    let capped = capped.trim_end_matches(|c| c == ' ' || c == '.');
    if capped.is_empty() {
        UNTITLED.to_string()
    } else {
        capped.to_string()
    }
}

/// Directory name of a note inside its album
pub fn note_folder_name(title: &str, id: &str) -> String {
    format!("{}_{}", sanitize_segment(title), id)
}

/// Storage album for a remote album name
///
/// Remote names cannot be rejected, so they are sanitized; a name landing on
/// a virtual view gets a trailing `_`.
pub fn storage_album_name(remote_name: &str) -> String {
    let safe = sanitize_segment(remote_name);
    if is_reserved_album_name(&safe) {
        format!("{}_", safe)
    } else {
        safe
    }
}

/// Validate a user-supplied album name
///
/// Reserved view names are a `Conflict`; anything that is not already a safe
/// path segment is a `Validation` error.
pub fn validate_album_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("album name must not be empty".to_string()));
    }
    if is_reserved_album_name(name) {
        return Err(Error::Conflict(format!(
            "album name '{}' is reserved for a built-in view",
            name
        )));
    }
    if name.starts_with('.') {
        return Err(Error::Validation(format!(
            "album name '{}' must not start with '.'",
            name
        )));
    }
    if sanitize_segment(name) != name {
        return Err(Error::Validation(format!(
            "album name '{}' contains characters not allowed in a folder name",
            name
        )));
    }
    Ok(())
}

/// Validate a note id before it becomes part of a path
pub fn validate_note_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid note id '{}'", id)))
    }
}

/// File extension for a media URL, falling back to `default`
pub fn media_extension(url: &str, allowed: &[&str], default: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) if allowed.contains(&ext.to_ascii_lowercase().as_str()) => {
            ext.to_ascii_lowercase()
        }
        _ => default.to_string(),
    }
}
