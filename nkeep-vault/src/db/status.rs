//! Learned / starred overlay rows

use chrono::Utc;
use nkeep_common::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{NoteStatus, StatusSnapshot};

/// Overlay flag a toggle applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFlag {
    Learned,
    Starred,
}

impl StatusFlag {
    // Column names cannot be bound, so each flag carries its own statement.
    // Absent rows start at false, so the first toggle inserts true.
    fn toggle_sql(self) -> &'static str {
        match self {
            StatusFlag::Learned => {
                r#"
                INSERT INTO note_status (note_id, is_learned, is_starred, updated_at)
                VALUES (?, 1, 0, ?)
                ON CONFLICT(note_id) DO UPDATE SET
                    is_learned = 1 - is_learned,
                    updated_at = excluded.updated_at
                RETURNING is_learned AS value
                "#
            }
            StatusFlag::Starred => {
                r#"
                INSERT INTO note_status (note_id, is_learned, is_starred, updated_at)
                VALUES (?, 0, 1, ?)
                ON CONFLICT(note_id) DO UPDATE SET
                    is_starred = 1 - is_starred,
                    updated_at = excluded.updated_at
                RETURNING is_starred AS value
                "#
            }
        }
    }
}

/// Flip one flag in a single statement and return the new value
pub async fn toggle(pool: &SqlitePool, note_id: &str, flag: StatusFlag) -> Result<bool> {
    let row = sqlx::query(flag.toggle_sql())
        .bind(note_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(pool)
        .await?;
    let value: i64 = row.get("value");
    Ok(value != 0)
}

pub async fn load_status(pool: &SqlitePool, note_id: &str) -> Result<NoteStatus> {
    let row = sqlx::query("SELECT is_learned, is_starred FROM note_status WHERE note_id = ?")
        .bind(note_id)
        .fetch_optional(pool)
        .await?;

    Ok(row
        .map(|row| NoteStatus {
            is_learned: row.get::<i64, _>("is_learned") != 0,
            is_starred: row.get::<i64, _>("is_starred") != 0,
        })
        .unwrap_or_default())
}

/// All rows with at least one flag set
pub async fn load_all(pool: &SqlitePool) -> Result<StatusSnapshot> {
    let rows = sqlx::query(
        "SELECT note_id, is_learned, is_starred FROM note_status WHERE is_learned != 0 OR is_starred != 0",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            (
                row.get("note_id"),
                NoteStatus {
                    is_learned: row.get::<i64, _>("is_learned") != 0,
                    is_starred: row.get::<i64, _>("is_starred") != 0,
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;

    #[tokio::test]
    async fn test_toggle_flips_from_false() {
        let (_temp, pool) = temp_pool().await;

        assert!(toggle(&pool, "n1", StatusFlag::Starred).await.unwrap());
        assert!(!toggle(&pool, "n1", StatusFlag::Starred).await.unwrap());

        let status = load_status(&pool, "n1").await.unwrap();
        assert_eq!(status, NoteStatus::default());
    }

    #[tokio::test]
    async fn test_flags_are_independent() {
        let (_temp, pool) = temp_pool().await;

        toggle(&pool, "n1", StatusFlag::Learned).await.unwrap();
        toggle(&pool, "n1", StatusFlag::Starred).await.unwrap();
        toggle(&pool, "n2", StatusFlag::Learned).await.unwrap();
        toggle(&pool, "n2", StatusFlag::Learned).await.unwrap();

        let all = load_all(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["n1"], NoteStatus { is_learned: true, is_starred: true });
    }

    #[tokio::test]
    async fn test_missing_row_reads_as_false() {
        let (_temp, pool) = temp_pool().await;
        assert_eq!(load_status(&pool, "nope").await.unwrap(), NoteStatus::default());
    }
}
