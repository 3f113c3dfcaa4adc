//! Custom album registry and copy links
//!
//! Links may point into any album, remote or custom; the organizer checks
//! the album exists before linking.

use chrono::Utc;
use nkeep_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::{HashMap, HashSet};

/// Register a custom album; returns false if the name was already taken
pub async fn insert_album(pool: &SqlitePool, name: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO albums (name, created_at)
        VALUES (?, ?)
        ON CONFLICT(name) DO NOTHING
        "#,
    )
    .bind(name)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn album_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Custom album names in creation order
pub async fn load_album_names(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT name FROM albums ORDER BY created_at, name")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("name")).collect())
}

/// Link a note into an album; returns false if the link already existed
pub async fn add_link(pool: &SqlitePool, album: &str, note_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO album_links (album, note_id, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(album, note_id) DO NOTHING
        "#,
    )
    .bind(album)
    .bind(note_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Returns false if there was no such link
pub async fn remove_link(pool: &SqlitePool, album: &str, note_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM album_links WHERE album = ? AND note_id = ?")
        .bind(album)
        .bind(note_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Note ids linked into one album
pub async fn linked_ids(pool: &SqlitePool, album: &str) -> Result<HashSet<String>> {
    let rows = sqlx::query("SELECT note_id FROM album_links WHERE album = ?")
        .bind(album)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("note_id")).collect())
}

/// Every link, grouped by note id; album names sorted
pub async fn links_by_note(pool: &SqlitePool) -> Result<HashMap<String, Vec<String>>> {
    let rows = sqlx::query("SELECT album, note_id FROM album_links ORDER BY album")
        .fetch_all(pool)
        .await?;

    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let note_id: String = row.get("note_id");
        out.entry(note_id).or_default().push(row.get("album"));
    }
    Ok(out)
}

/// Albums holding a link to one note
pub async fn albums_linking(pool: &SqlitePool, note_id: &str) -> Result<Vec<String>> {
    let rows = sqlx::query("SELECT album FROM album_links WHERE note_id = ? ORDER BY album")
        .bind(note_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|row| row.get("album")).collect())
}

/// Link counts per album
pub async fn link_counts(pool: &SqlitePool) -> Result<HashMap<String, usize>> {
    let rows = sqlx::query("SELECT album, COUNT(*) AS n FROM album_links GROUP BY album")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| {
            let n: i64 = row.get("n");
            (row.get("album"), n.max(0) as usize)
        })
        .collect())
}
