use std::collections::BTreeSet;

use super::RoleCategory;

/// Principal as seen by one authorization decision.
///
/// Built from the directory record plus the role lookup. `role_category` is `None` when the
/// principal has no role or references a role that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role_code: Option<String>,
    pub role_category: Option<RoleCategory>,
    pub department: Option<String>,
    pub teams: BTreeSet<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role_code: None,
            role_category: None,
            department: None,
            teams: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, code: impl Into<String>, category: RoleCategory) -> Self {
        self.role_code = Some(code.into());
        self.role_category = Some(category);
        self
    }

    /// Role code that did not resolve to a role row.
    pub fn with_orphaned_role(mut self, code: impl Into<String>) -> Self {
        self.role_code = Some(code.into());
        self.role_category = None;
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_teams(mut self, teams: impl IntoIterator<Item = String>) -> Self {
        self.teams = teams.into_iter().collect();
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role_category == Some(RoleCategory::Admin)
    }

    /// Role code usable for permission lookups; orphaned codes count as no role.
    pub fn effective_role_code(&self) -> Option<&str> {
        self.role_category.and(self.role_code.as_deref())
    }
}
