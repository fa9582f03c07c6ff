use std::collections::BTreeMap;

use sqlx::SqlitePool;

use crate::assignment::engine::PlannedAssignment;
use crate::assignment::AssignmentPolicy;
use crate::errors::AppResult;
use crate::models::work::{AssignmentRecord, LoadReport, WorkItem};
use crate::utils::utc_now;

/// Result of a conditional ownership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The item already had an owner when the write landed
    Stale,
}

#[derive(Debug, Clone)]
pub struct WorkStore {
    pool: SqlitePool,
}

impl WorkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn unassigned_items(&self, branch: &str) -> AppResult<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(
            r#"
            SELECT id, branch, business_date, origin_agent, owner, status, country
            FROM work_items
            WHERE branch = ? AND owner IS NULL
            ORDER BY id
            "#,
        )
        .bind(branch)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// `(agent, period, count)` over every committed assignment of the pool.
    pub async fn load_counts(&self, pool_key: &str) -> AppResult<Vec<(String, String, u64)>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT agent_id, period_key, COUNT(*)
            FROM assignment_records
            WHERE pool_key = ?
            GROUP BY agent_id, period_key
            "#,
        )
        .bind(pool_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(agent, period, count)| (agent, period, count.max(0) as u64))
            .collect())
    }

    pub async fn load_report(&self, pool_key: &str) -> AppResult<LoadReport> {
        let mut periods: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for (agent, period, count) in self.load_counts(pool_key).await? {
            periods.entry(period).or_default().insert(agent, count);
        }
        Ok(LoadReport {
            pool_key: pool_key.to_string(),
            periods,
        })
    }

    /// Commits one chunk in a single transaction. Each item is only claimed if it is still
    /// unowned; outcomes come back in input order.
    pub async fn commit_batch(
        &self,
        pool_key: &str,
        policy: AssignmentPolicy,
        batch: &[PlannedAssignment],
    ) -> AppResult<Vec<ClaimOutcome>> {
        let now = utc_now();
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut tx = self.pool.begin().await?;

        for planned in batch {
            let claimed = sqlx::query("UPDATE work_items SET owner = ? WHERE id = ? AND owner IS NULL")
                .bind(&planned.agent_id)
                .bind(planned.item_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if claimed == 0 {
                outcomes.push(ClaimOutcome::Stale);
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO assignment_records (work_item_id, agent_id, pool_key, period_key, policy, assigned_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(planned.item_id)
            .bind(&planned.agent_id)
            .bind(pool_key)
            .bind(&planned.period_key)
            .bind(policy.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            outcomes.push(ClaimOutcome::Claimed);
        }

        tx.commit().await?;
        Ok(outcomes)
    }

    pub async fn records_for_item(&self, item_id: i64) -> AppResult<Vec<AssignmentRecord>> {
        let records = sqlx::query_as::<_, AssignmentRecord>(
            r#"
            SELECT work_item_id, agent_id, pool_key, period_key, policy, assigned_at
            FROM assignment_records
            WHERE work_item_id = ?
            ORDER BY id
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
