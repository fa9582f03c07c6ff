use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::time::Instant;

use super::engine::{self, AssignmentRule, Candidate, LoadLedger, PlannedAssignment};
use super::{AssignmentPolicy, Roster};
use crate::config::EngineConfig;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, EventBus};
use crate::models::work::{CommittedAssignment, PoolFilter, RunReport, RunSummary, SkipReason, SkippedItem};
use crate::store::{ClaimOutcome, CursorStore, DirectoryAdapter, WorkStore};
use crate::utils::period_key;

/// Loads a pool, decides owners and commits them in bounded transactions.
#[derive(Clone)]
pub struct AssignmentRunner {
    work: WorkStore,
    cursors: CursorStore,
    directory: Arc<dyn DirectoryAdapter>,
    event_bus: EventBus,
    batch_size: usize,
    run_timeout: Option<Duration>,
}

impl AssignmentRunner {
    pub fn new(pool: SqlitePool, directory: Arc<dyn DirectoryAdapter>, event_bus: EventBus, config: &EngineConfig) -> Self {
        Self {
            work: WorkStore::new(pool.clone()),
            cursors: CursorStore::new(pool),
            directory,
            event_bus,
            batch_size: config.batch_size.max(1),
            run_timeout: config.run_timeout,
        }
    }

    pub fn work(&self) -> &WorkStore {
        &self.work
    }

    pub fn cursors(&self) -> &CursorStore {
        &self.cursors
    }

    pub async fn run(&self, policy: AssignmentPolicy, filter: &PoolFilter, actor: Option<&str>) -> AppResult<RunReport> {
        let key = filter.pool_key();
        let pool_key = key.as_str();
        let roster = Roster::new(self.directory.roster(filter.roster_team()).await?);
        if roster.is_empty() {
            tracing::warn!(pool_key, team = filter.roster_team(), "assignment run aborted, empty roster");
            return Err(AppError::no_eligible_agents(format!(
                "no active agents in team '{}'",
                filter.roster_team()
            )));
        }

        let deadline = self.run_timeout.map(|timeout| Instant::now() + timeout);
        let mut report = RunReport::default();
        let candidates = self.collect_candidates(filter, &mut report).await?;

        tracing::info!(
            pool_key,
            policy = %policy,
            agents = roster.len(),
            candidates = candidates.len(),
            "assignment run started"
        );

        match policy {
            AssignmentPolicy::LoadAware => {
                let mut ledger = LoadLedger::from_counts(&roster, self.work.load_counts(pool_key).await?);
                let ordered = engine::order_for_planning(&roster, candidates);

                let mut chunks = ordered.chunks(self.batch_size);
                while let Some(chunk) = chunks.next() {
                    if past(deadline) {
                        skip_remaining(&mut report, chunk.iter().chain(chunks.by_ref().flatten()));
                        break;
                    }

                    let planned: Vec<PlannedAssignment> = chunk
                        .iter()
                        .filter_map(|candidate| engine::plan_one(&roster, &mut ledger, candidate))
                        .collect();
                    let outcomes = self.work.commit_batch(pool_key, policy, &planned).await?;
                    settle(&mut report, &planned, &outcomes, Some(&mut ledger));
                }
            }
            AssignmentPolicy::RoundRobin => {
                let mut chunks = candidates.chunks(self.batch_size);
                while let Some(chunk) = chunks.next() {
                    if past(deadline) {
                        skip_remaining(&mut report, chunk.iter().chain(chunks.by_ref().flatten()));
                        break;
                    }

                    // Positions are drawn before the commit; a stale claim or failed chunk
                    // does not give them back.
                    let mut planned = Vec::with_capacity(chunk.len());
                    for candidate in chunk {
                        planned.push(PlannedAssignment {
                            item_id: candidate.item_id,
                            agent_id: self.cursors.next_agent(pool_key, &roster).await?,
                            period_key: candidate.period_key.clone(),
                            rule: AssignmentRule::Rotation,
                        });
                    }
                    let outcomes = self.work.commit_batch(pool_key, policy, &planned).await?;
                    settle(&mut report, &planned, &outcomes, None);
                }
            }
        }

        let summary = RunSummary {
            pool_key: pool_key.to_string(),
            policy,
            assigned: report.assigned,
            stale: report.stale,
            skipped: report.skipped.len(),
        };
        tracing::info!(
            pool_key,
            policy = %policy,
            assigned = summary.assigned,
            stale = summary.stale,
            skipped = summary.skipped,
            "assignment run finished"
        );
        log_activity(&self.event_bus, "completed", actor, &summary);

        Ok(report)
    }

    /// Eligible items of the pool in ascending id order. Items whose period cannot be derived
    /// are reported as skipped.
    async fn collect_candidates(&self, filter: &PoolFilter, report: &mut RunReport) -> AppResult<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for item in self.work.unassigned_items(&filter.branch).await? {
            if !filter.accepts(&item) {
                continue;
            }
            let Some(period) = period_key(item.business_date.as_deref()) else {
                tracing::debug!(item_id = item.id, business_date = ?item.business_date, "skipping item without a valid business date");
                report.skipped.push(SkippedItem {
                    item_id: item.id,
                    reason: SkipReason::InvalidBusinessDate,
                });
                continue;
            };
            if !filter.period_in_range(&period) {
                continue;
            }
            candidates.push(Candidate {
                item_id: item.id,
                period_key: period,
                origin_agent: item.origin_agent,
            });
        }

        Ok(candidates)
    }
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

fn skip_remaining<'a>(report: &mut RunReport, remaining: impl Iterator<Item = &'a Candidate>) {
    let before = report.skipped.len();
    report.skipped.extend(remaining.map(|candidate| SkippedItem {
        item_id: candidate.item_id,
        reason: SkipReason::DeadlineExceeded,
    }));
    tracing::warn!(skipped = report.skipped.len() - before, "assignment run deadline exceeded");
}

/// Folds commit outcomes into the report. Stale items give back their planned increment.
fn settle(
    report: &mut RunReport,
    planned: &[PlannedAssignment],
    outcomes: &[ClaimOutcome],
    mut ledger: Option<&mut LoadLedger>,
) {
    for (assignment, outcome) in planned.iter().zip(outcomes) {
        match outcome {
            ClaimOutcome::Claimed => {
                report.assigned += 1;
                report.assignments.push(CommittedAssignment {
                    item_id: assignment.item_id,
                    agent_id: assignment.agent_id.clone(),
                });
            }
            ClaimOutcome::Stale => {
                tracing::debug!(item_id = assignment.item_id, "item claimed elsewhere, dropped from run");
                report.stale += 1;
                if let Some(ledger) = ledger.as_deref_mut() {
                    ledger.decrement(&assignment.agent_id, &assignment.period_key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(id: i64, agent: &str) -> PlannedAssignment {
        PlannedAssignment {
            item_id: id,
            agent_id: agent.to_string(),
            period_key: "2026-01".to_string(),
            rule: AssignmentRule::LeastLoaded,
        }
    }

    #[test]
    fn settle_counts_stale_and_rolls_back_load() {
        let mut ledger = LoadLedger::new();
        ledger.increment("a", "2026-01");
        ledger.increment("b", "2026-01");
        let mut report = RunReport::default();

        settle(
            &mut report,
            &[planned(1, "a"), planned(2, "b")],
            &[ClaimOutcome::Claimed, ClaimOutcome::Stale],
            Some(&mut ledger),
        );

        assert_eq!(report.assigned, 1);
        assert_eq!(report.stale, 1);
        assert_eq!(report.assignments, vec![CommittedAssignment { item_id: 1, agent_id: "a".into() }]);
        assert_eq!(ledger.count("a", "2026-01"), 1);
        assert_eq!(ledger.count("b", "2026-01"), 0);
    }

    #[test]
    fn remaining_items_are_reported_past_deadline() {
        let candidates: Vec<Candidate> = (1..=3)
            .map(|id| Candidate { item_id: id, period_key: "2026-01".into(), origin_agent: None })
            .collect();
        let mut report = RunReport::default();
        skip_remaining(&mut report, candidates.iter());

        assert_eq!(report.skipped.len(), 3);
        assert!(report.skipped.iter().all(|s| s.reason == SkipReason::DeadlineExceeded));
        assert!(past(Some(Instant::now())));
        assert!(!past(None));
    }
}
