//! Authorization module - decision functions, permission cache and resolver
//!
//! This module implements the menu and resource permission model:
//! - Role categories (admin / partner / employee) gating menus, with department scoping
//! - Role x resource permissions with view/edit/delete flags and a column set
//! - Admin bypass, decided in exactly one place (`evaluator`)
//! - Configurable enforcement of the administrative API (off/advisory/strict)

mod cache;
mod columns;
mod evaluator;
mod principal;
mod resolver;

pub use cache::PermissionCache;
pub use columns::AllOrSet;
pub use evaluator::{menu_decision, resource_decision, DecisionReason, MenuDecision, ResourceAccess};
pub use principal::Principal;
pub use resolver::AuthorizationResolver;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// Enforcement mode for the administrative API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzMode {
    /// No admin checks (development mode)
    Off,
    /// Log denials but allow requests (testing mode)
    Advisory,
    /// Enforce 403 on denied requests (production mode)
    Strict,
}

impl AuthzMode {
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_lowercase().as_str() {
            "off" => Ok(AuthzMode::Off),
            "advisory" => Ok(AuthzMode::Advisory),
            "strict" | "" => Ok(AuthzMode::Strict),
            other => Err(AppError::configuration(format!("unknown AUTHZ_MODE '{other}'"))),
        }
    }
}

/// Category a role belongs to. Menu permissions are granted per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleCategory {
    Admin,
    /// Partners and managers
    #[serde(alias = "manager")]
    Partner,
    Employee,
}

impl RoleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleCategory::Admin => "admin",
            RoleCategory::Partner => "partner",
            RoleCategory::Employee => "employee",
        }
    }
}

impl fmt::Display for RoleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(RoleCategory::Admin),
            "partner" | "manager" => Ok(RoleCategory::Partner),
            "employee" => Ok(RoleCategory::Employee),
            other => Err(format!("unknown role category '{other}'")),
        }
    }
}

/// Action requested on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Edit,
    Delete,
}

/// Well-known resource codes used by this service itself
pub mod resources {
    pub const ASSIGNMENT_RUNS: &str = "assignment_runs";
    pub const ROTATION_CURSORS: &str = "rotation_cursors";
}
