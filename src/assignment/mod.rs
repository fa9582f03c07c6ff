//! Fair assignment of unowned work items to the agents of a pool.

pub mod engine;
pub mod runner;
pub mod scheduler;

pub use runner::AssignmentRunner;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentPolicy {
    /// Self-service first, then least loaded agent for the item's period
    LoadAware,
    /// Durable per-pool cursor over the sorted roster
    RoundRobin,
}

impl AssignmentPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentPolicy::LoadAware => "load_aware",
            AssignmentPolicy::RoundRobin => "round_robin",
        }
    }
}

impl fmt::Display for AssignmentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "load_aware" => Ok(AssignmentPolicy::LoadAware),
            "round_robin" => Ok(AssignmentPolicy::RoundRobin),
            other => Err(format!("unknown assignment policy '{other}'")),
        }
    }
}

/// Eligible agents of a pool: deduplicated, blank ids dropped, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    agents: Vec<String>,
}

impl Roster {
    pub fn new<I>(agents: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut agents: Vec<String> = agents
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        agents.sort();
        agents.dedup();
        Self { agents }
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.agents.get(index).map(String::as_str)
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.agents.binary_search_by(|a| a.as_str().cmp(agent)).is_ok()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
