use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::assignment::AssignmentPolicy;
use crate::events::{Loggable, Severity};

// =============================================================================
// WORK ITEM
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WorkItem {
    pub id: i64,
    pub branch: String,
    /// Order date the load period is derived from
    pub business_date: Option<String>,
    /// Agent who originated the order, e.g. the salesperson
    pub origin_agent: Option<String>,
    pub owner: Option<String>,
    pub status: String,
    pub country: Option<String>,
}

/// Which work items a run considers.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PoolFilter {
    #[schema(example = "north")]
    pub branch: String,
    /// Directory team whose members form the roster. Defaults to the branch.
    #[serde(default)]
    pub team: Option<String>,
    /// Inclusive lower bound, `YYYY-MM`
    #[serde(default)]
    #[schema(example = "2026-01")]
    pub period_from: Option<String>,
    /// Inclusive upper bound, `YYYY-MM`
    #[serde(default)]
    pub period_to: Option<String>,
    /// Accepted funding/confirmation states. Empty accepts any.
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub excluded_countries: Vec<String>,
}

impl PoolFilter {
    pub fn for_branch(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Self::default()
        }
    }

    pub fn roster_team(&self) -> &str {
        self.team.as_deref().unwrap_or(&self.branch)
    }

    /// Pool the load counters and rotation cursor are keyed by: the branch, or `branch:team`
    /// when the roster comes from another team.
    pub fn pool_key(&self) -> String {
        match self.team.as_deref().map(str::trim) {
            Some(team) if !team.is_empty() && team != self.branch => format!("{}:{}", self.branch, team),
            _ => self.branch.clone(),
        }
    }

    /// Eligibility checks that do not need the period.
    pub fn accepts(&self, item: &WorkItem) -> bool {
        if item.owner.is_some() || item.branch != self.branch {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.iter().any(|s| s == &item.status) {
            return false;
        }
        match item.country.as_deref() {
            Some(country) => !self.excluded_countries.iter().any(|c| c.eq_ignore_ascii_case(country)),
            None => true,
        }
    }

    pub fn period_in_range(&self, period_key: &str) -> bool {
        let after_start = self.period_from.as_deref().map_or(true, |from| period_key >= from);
        let before_end = self.period_to.as_deref().map_or(true, |to| period_key <= to);
        after_start && before_end
    }
}

// =============================================================================
// ASSIGNMENT RECORD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AssignmentRecord {
    pub work_item_id: i64,
    pub agent_id: String,
    pub pool_key: String,
    pub period_key: String,
    pub policy: String,
    pub assigned_at: DateTime<Utc>,
}

// =============================================================================
// ROTATION CURSOR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RotationCursor {
    pub pool_key: String,
    pub position: i64,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for RotationCursor {
    fn entity_type() -> &'static str { "rotation_cursor" }
    fn subject_id(&self) -> String { self.pool_key.clone() }
    fn severity(&self) -> Severity { Severity::Important }
}

// =============================================================================
// RUN REQUEST / REPORT
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RunAssignmentRequest {
    pub policy: AssignmentPolicy,
    pub pool: PoolFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Business date missing or unparseable, so no period can be derived
    InvalidBusinessDate,
    /// Run deadline passed before the item's batch was committed
    DeadlineExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SkippedItem {
    pub item_id: i64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RunReport {
    pub assigned: usize,
    /// Items another run claimed first; dropped from this run without retry
    pub stale: usize,
    pub skipped: Vec<SkippedItem>,
    pub assignments: Vec<CommittedAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CommittedAssignment {
    pub item_id: i64,
    pub agent_id: String,
}

/// Audit summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pool_key: String,
    pub policy: AssignmentPolicy,
    pub assigned: usize,
    pub stale: usize,
    pub skipped: usize,
}

impl Loggable for RunSummary {
    fn entity_type() -> &'static str { "assignment_run" }
    fn subject_id(&self) -> String { self.pool_key.clone() }
    fn severity_for_action(&self, _action: &str) -> Severity { Severity::Important }
}

/// Per-agent, per-period committed load for one pool.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct LoadReport {
    pub pool_key: String,
    /// period -> agent -> count
    pub periods: BTreeMap<String, BTreeMap<String, u64>>,
}
