use std::time::Duration;

use crate::assignment::AssignmentPolicy;
use crate::authz::AuthzMode;
use crate::errors::AppError;

const DEFAULT_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_BATCH_SIZE: usize = 200;
const DEFAULT_SCHEDULE_SECS: u64 = 300;

/// A pool the background scheduler runs on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledPool {
    pub branch: String,
    pub policy: AssignmentPolicy,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub authz_mode: AuthzMode,
    pub permission_cache_ttl: Duration,
    pub batch_size: usize,
    pub run_timeout: Option<Duration>,
    pub schedule: Vec<ScheduledPool>,
    pub schedule_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            authz_mode: AuthzMode::Strict,
            permission_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            run_timeout: None,
            schedule: Vec::new(),
            schedule_interval: Duration::from_secs(DEFAULT_SCHEDULE_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let authz_mode = match std::env::var("AUTHZ_MODE") {
            Ok(value) => AuthzMode::parse(&value)?,
            Err(_) => defaults.authz_mode,
        };

        let permission_cache_ttl = env_u64("PERMISSION_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.permission_cache_ttl);

        let batch_size = match env_u64("ASSIGNMENT_BATCH_SIZE")? {
            Some(0) => return Err(AppError::configuration("ASSIGNMENT_BATCH_SIZE must be positive")),
            Some(n) => n as usize,
            None => defaults.batch_size,
        };

        let run_timeout = env_u64("ASSIGNMENT_RUN_TIMEOUT_SECS")?.map(Duration::from_secs);

        let schedule = match std::env::var("ASSIGNMENT_SCHEDULE") {
            Ok(raw) => parse_schedule(&raw)?,
            Err(_) => Vec::new(),
        };

        let schedule_interval = env_u64("ASSIGNMENT_SCHEDULE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.schedule_interval);

        Ok(Self {
            authz_mode,
            permission_cache_ttl,
            batch_size,
            run_timeout,
            schedule,
            schedule_interval,
        })
    }
}

fn env_u64(key: &str) -> Result<Option<u64>, AppError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| AppError::configuration(format!("{key} must be a valid integer"))),
        Err(_) => Ok(None),
    }
}

/// Parses `branch:policy` pairs separated by commas, e.g. `north:load_aware,south:round_robin`.
pub fn parse_schedule(raw: &str) -> Result<Vec<ScheduledPool>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (branch, policy) = entry
                .split_once(':')
                .ok_or_else(|| AppError::configuration(format!("invalid schedule entry '{entry}'")))?;
            let branch = branch.trim();
            if branch.is_empty() {
                return Err(AppError::configuration(format!("invalid schedule entry '{entry}'")));
            }
            let policy = policy
                .trim()
                .parse::<AssignmentPolicy>()
                .map_err(AppError::configuration)?;
            Ok(ScheduledPool {
                branch: branch.to_string(),
                policy,
            })
        })
        .collect()
}
