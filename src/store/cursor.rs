use sqlx::SqlitePool;

use crate::assignment::Roster;
use crate::errors::{AppError, AppResult};
use crate::models::work::RotationCursor;
use crate::utils::utc_now;

/// Persistent round-robin positions, one row per pool.
#[derive(Debug, Clone)]
pub struct CursorStore {
    pool: SqlitePool,
}

impl CursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Hands out the next agent for the pool and advances the cursor in the same statement,
    /// so concurrent callers never observe the same position.
    pub async fn next_agent(&self, pool_key: &str, roster: &Roster) -> AppResult<String> {
        if roster.is_empty() {
            return Err(AppError::no_eligible_agents(format!("roster for '{pool_key}' is empty")));
        }

        let advanced: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rotation_cursors (pool_key, position, updated_at) VALUES (?, 1, ?)
            ON CONFLICT(pool_key) DO UPDATE SET
                position = rotation_cursors.position + 1,
                updated_at = excluded.updated_at
            RETURNING position
            "#,
        )
        .bind(pool_key)
        .bind(utc_now())
        .fetch_one(&self.pool)
        .await?;

        let position = (advanced - 1).max(0) as usize;
        roster
            .get(position % roster.len())
            .map(str::to_string)
            .ok_or_else(|| AppError::internal("rotation index out of range"))
    }

    pub async fn cursor(&self, pool_key: &str) -> AppResult<Option<RotationCursor>> {
        let row: Option<RotationCursor> =
            sqlx::query_as("SELECT pool_key, position, updated_at FROM rotation_cursors WHERE pool_key = ?")
                .bind(pool_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    /// Position the next call to `next_agent` will hand out. Zero for a pool never rotated.
    pub async fn position(&self, pool_key: &str) -> AppResult<i64> {
        Ok(self.cursor(pool_key).await?.map(|c| c.position).unwrap_or(0))
    }

    pub async fn reset(&self, pool_key: &str) -> AppResult<RotationCursor> {
        let now = utc_now();
        sqlx::query(
            r#"
            INSERT INTO rotation_cursors (pool_key, position, updated_at) VALUES (?, 0, ?)
            ON CONFLICT(pool_key) DO UPDATE SET position = 0, updated_at = excluded.updated_at
            "#,
        )
        .bind(pool_key)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(RotationCursor {
            pool_key: pool_key.to_string(),
            position: 0,
            updated_at: now,
        })
    }
}
