use serde::Serialize;
use utoipa::ToSchema;

use super::columns::AllOrSet;
use super::principal::Principal;
use super::{Action, RoleCategory};
use crate::models::rbac::{MenuPermission, ResourcePermission};

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    AdminOverride,
    Granted,
    /// No permission row exists for the menu or (role, resource) pair
    NotConfigured,
    /// Principal has no role, or its role code does not resolve
    NoRole,
    RoleNotAllowed,
    DepartmentNotAllowed,
    ActionNotPermitted,
    UnknownPrincipal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MenuDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl MenuDecision {
    fn allow(reason: DecisionReason) -> Self {
        Self { allowed: true, reason }
    }

    pub(crate) fn deny(reason: DecisionReason) -> Self {
        Self { allowed: false, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ResourceAccess {
    pub allowed: bool,
    /// Columns the caller may read. `{"mode":"all"}` or `{"mode":"set","columns":[...]}`.
    #[schema(value_type = Object)]
    pub columns: AllOrSet,
    pub reason: DecisionReason,
}

impl ResourceAccess {
    pub(crate) fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            columns: AllOrSet::empty(),
            reason,
        }
    }
}

/// Menu access decision.
///
/// Evaluation order:
/// 1. admin category -> allow, whatever is stored
/// 2. no role -> deny
/// 3. no menu permission row -> deny (fail closed)
/// 4. category not in allowed roles -> deny
/// 5. employee -> allow only if allowed departments is present, non-empty and contains
///    the principal's department
/// 6. partner -> allow
pub fn menu_decision(principal: &Principal, permission: Option<&MenuPermission>) -> MenuDecision {
    let category = match principal.role_category {
        Some(RoleCategory::Admin) => return MenuDecision::allow(DecisionReason::AdminOverride),
        Some(category) => category,
        None => return MenuDecision::deny(DecisionReason::NoRole),
    };

    let Some(permission) = permission else {
        return MenuDecision::deny(DecisionReason::NotConfigured);
    };

    if !permission.allowed_roles.contains(&category) {
        return MenuDecision::deny(DecisionReason::RoleNotAllowed);
    }

    match category {
        RoleCategory::Employee => {
            let department_allowed = match (&permission.allowed_departments, &principal.department) {
                (Some(departments), Some(department)) => departments.contains(department),
                _ => false,
            };
            if department_allowed {
                MenuDecision::allow(DecisionReason::Granted)
            } else {
                MenuDecision::deny(DecisionReason::DepartmentNotAllowed)
            }
        }
        RoleCategory::Partner | RoleCategory::Admin => MenuDecision::allow(DecisionReason::Granted),
    }
}

/// Resource access decision. Pure: the column set is returned, never applied.
pub fn resource_decision(
    principal: &Principal,
    permission: Option<&ResourcePermission>,
    action: Action,
) -> ResourceAccess {
    if principal.is_admin() {
        return ResourceAccess {
            allowed: true,
            columns: AllOrSet::All,
            reason: DecisionReason::AdminOverride,
        };
    }

    if principal.effective_role_code().is_none() {
        return ResourceAccess::deny(DecisionReason::NoRole);
    }

    let Some(permission) = permission else {
        return ResourceAccess::deny(DecisionReason::NotConfigured);
    };

    let allowed = permission.allows(action);
    ResourceAccess {
        allowed,
        columns: permission.allowed_columns.clone(),
        reason: if allowed {
            DecisionReason::Granted
        } else {
            DecisionReason::ActionNotPermitted
        },
    }
}
