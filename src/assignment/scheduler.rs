use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::AssignmentRunner;
use crate::config::ScheduledPool;
use crate::errors::{AppError, AppResult};
use crate::models::work::{PoolFilter, RunReport};

/// Runs every configured pool once, in order. One failing pool does not stop the others.
pub async fn run_scheduled(runner: &AssignmentRunner, schedule: &[ScheduledPool]) -> Vec<(String, AppResult<RunReport>)> {
    let mut results = Vec::with_capacity(schedule.len());

    for entry in schedule {
        let filter = PoolFilter::for_branch(entry.branch.clone());
        let result = runner.run(entry.policy, &filter, None).await;
        match &result {
            Ok(report) => tracing::debug!(branch = %entry.branch, assigned = report.assigned, "scheduled run done"),
            Err(AppError::NoEligibleAgents(msg)) => tracing::warn!(branch = %entry.branch, "scheduled run skipped: {msg}"),
            Err(err) => tracing::error!(branch = %entry.branch, error = %err, "scheduled run failed"),
        }
        results.push((entry.branch.clone(), result));
    }

    results
}

/// Spawns the periodic assignment task. `None` when nothing is scheduled.
pub fn spawn_scheduler(runner: AssignmentRunner, schedule: Vec<ScheduledPool>, every: Duration) -> Option<JoinHandle<()>> {
    if schedule.is_empty() {
        return None;
    }

    tracing::info!(pools = schedule.len(), every_secs = every.as_secs(), "assignment scheduler started");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            run_scheduled(&runner, &schedule).await;
        }
    }))
}
