use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::DirectoryAdapter;
use crate::errors::AppResult;
use crate::models::directory::{DbPrincipal, DirectoryEntry};

/// Directory tables synced from the HR system. Never written here.
#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    pool: SqlitePool,
}

impl SqliteDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryAdapter for SqliteDirectory {
    async fn principal(&self, id: &str) -> AppResult<Option<DirectoryEntry>> {
        let Some(row) = sqlx::query_as::<_, DbPrincipal>(
            "SELECT id, name, role_code, department FROM principals WHERE id = ? AND active = 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let teams: Vec<String> = sqlx::query_scalar("SELECT team FROM principal_teams WHERE principal_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(row.into_entry(teams.into_iter().collect::<BTreeSet<_>>())))
    }

    async fn roster(&self, team: &str) -> AppResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.id
            FROM principals p
            INNER JOIN principal_teams t ON t.principal_id = p.id
            WHERE t.team = ? AND p.active = 1
            ORDER BY p.id
            "#,
        )
        .bind(team)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
