use std::collections::BTreeSet;

use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;

/// Principal as published by the HR/identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
    pub role_code: Option<String>,
    pub department: Option<String>,
    pub teams: BTreeSet<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPrincipal {
    pub id: String,
    pub name: String,
    pub role_code: Option<String>,
    pub department: Option<String>,
}

impl DbPrincipal {
    pub fn into_entry(self, teams: BTreeSet<String>) -> DirectoryEntry {
        DirectoryEntry {
            id: self.id,
            name: self.name,
            role_code: self.role_code.filter(|code| !code.trim().is_empty()),
            department: self.department.filter(|dept| !dept.trim().is_empty()),
            teams,
        }
    }
}
