//! SQLite storage for user-owned state
//!
//! Only data the filesystem cannot express lives here: the custom album
//! registry, copy links and the learned/starred overlay. Note metadata never
//! enters the database.

pub mod albums;
pub mod status;

use nkeep_common::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Open (or create) the database and make sure all tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::io_context("create", parent.display(), e))?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    // Pragmas are per connection, so they go on the connect options
    let options = SqliteConnectOptions::from_str(&db_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Stand-in pool for a database that could not be opened
///
/// The pool is closed before it ever connects, so every query fails at once
/// with `PoolClosed` and nothing is created on disk.
pub async fn unavailable_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new().connect_lazy_with(SqliteConnectOptions::new());
    pool.close().await;
    pool
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS album_links (
            album TEXT NOT NULL,
            note_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (album, note_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS note_status (
            note_id TEXT PRIMARY KEY,
            is_learned INTEGER NOT NULL DEFAULT 0,
            is_starred INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (albums, album_links, note_status)");

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// File-backed pool; in-memory databases are per-connection
    pub async fn temp_pool() -> (TempDir, SqlitePool) {
        let temp = TempDir::new().unwrap();
        let pool = init_database_pool(&temp.path().join("vault.db")).await.unwrap();
        (temp, pool)
    }
}
