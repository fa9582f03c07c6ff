//! Load-aware planner.
//!
//! Pure and deterministic: given the roster, the committed load per period and the candidate
//! items, it decides an owner for each item. Nothing here touches the store.

use std::collections::HashMap;

use serde::Serialize;

use super::Roster;
use crate::errors::AppError;

/// Committed work per period per agent, restricted to the roster it was built for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadLedger {
    counts: HashMap<String, HashMap<String, u64>>,
}

impl LoadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the ledger from `(agent, period, count)` rows. Agents outside the roster are ignored.
    pub fn from_counts<I>(roster: &Roster, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String, u64)>,
    {
        let mut ledger = Self::new();
        for (agent, period, count) in rows {
            if roster.contains(&agent) {
                *ledger.counts.entry(period).or_default().entry(agent).or_default() += count;
            }
        }
        ledger
    }

    pub fn count(&self, agent: &str, period: &str) -> u64 {
        self.counts
            .get(period)
            .and_then(|agents| agents.get(agent))
            .copied()
            .unwrap_or(0)
    }

    pub fn increment(&mut self, agent: &str, period: &str) {
        *self
            .counts
            .entry(period.to_string())
            .or_default()
            .entry(agent.to_string())
            .or_default() += 1;
    }

    /// Undoes a planned increment whose commit lost the race.
    pub fn decrement(&mut self, agent: &str, period: &str) {
        if let Some(count) = self.counts.get_mut(period).and_then(|agents| agents.get_mut(agent)) {
            *count = count.saturating_sub(1);
        }
    }

    /// Agent with the lowest count for the period. Ties go to the earliest agent in roster order.
    pub fn least_loaded<'r>(&self, roster: &'r Roster, period: &str) -> Option<&'r str> {
        let mut best: Option<(&'r str, u64)> = None;
        for agent in roster.agents() {
            let count = self.count(agent, period);
            match best {
                Some((_, best_count)) if count >= best_count => {}
                _ => best = Some((agent.as_str(), count)),
            }
        }
        best.map(|(agent, _)| agent)
    }

    /// max - min count over the roster for one period.
    pub fn spread(&self, roster: &Roster, period: &str) -> u64 {
        let counts = roster.agents().iter().map(|agent| self.count(agent, period));
        let (min, max) = counts.fold((u64::MAX, 0), |(min, max), c| (min.min(c), max.max(c)));
        if roster.is_empty() {
            0
        } else {
            max - min
        }
    }
}

/// An eligible, unowned work item with its period already derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub item_id: i64,
    pub period_key: String,
    pub origin_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRule {
    /// The originating agent is on the roster and keeps the item
    SelfService,
    LeastLoaded,
    Rotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAssignment {
    pub item_id: i64,
    pub agent_id: String,
    pub period_key: String,
    pub rule: AssignmentRule,
}

fn is_self_service(roster: &Roster, candidate: &Candidate) -> bool {
    candidate
        .origin_agent
        .as_deref()
        .is_some_and(|agent| roster.contains(agent))
}

/// Ascending by id, with every self-service item ahead of the rest.
pub fn order_for_planning(roster: &Roster, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by_key(|c| c.item_id);
    let (mut ordered, rest): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| is_self_service(roster, c));
    ordered.extend(rest);
    ordered
}

/// Decides one item and records the increment in the ledger. `None` only for an empty roster.
pub fn plan_one(roster: &Roster, ledger: &mut LoadLedger, candidate: &Candidate) -> Option<PlannedAssignment> {
    let (agent, rule) = match candidate.origin_agent.as_deref() {
        Some(origin) if roster.contains(origin) => (origin.to_string(), AssignmentRule::SelfService),
        _ => (
            ledger.least_loaded(roster, &candidate.period_key)?.to_string(),
            AssignmentRule::LeastLoaded,
        ),
    };

    ledger.increment(&agent, &candidate.period_key);
    Some(PlannedAssignment {
        item_id: candidate.item_id,
        agent_id: agent,
        period_key: candidate.period_key.clone(),
        rule,
    })
}

/// Plans a whole pool in one pass.
pub fn plan(roster: &Roster, ledger: &mut LoadLedger, candidates: Vec<Candidate>) -> Result<Vec<PlannedAssignment>, AppError> {
    if roster.is_empty() {
        return Err(AppError::no_eligible_agents("roster is empty"));
    }

    Ok(order_for_planning(roster, candidates)
        .iter()
        .filter_map(|candidate| plan_one(roster, ledger, candidate))
        .collect())
}
