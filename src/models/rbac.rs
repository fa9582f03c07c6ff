use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::authz::{Action, AllOrSet, RoleCategory};
use crate::db::row_parsers::parse_json_column;
use crate::errors::AppError;
use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    pub category: RoleCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> String { self.code.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub code: String,
    pub name: String,
    pub department: Option<String>,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbRole> for Role {
    type Error = AppError;

    fn try_from(db: DbRole) -> Result<Self, Self::Error> {
        let category = db
            .category
            .parse::<RoleCategory>()
            .map_err(|err| AppError::internal(format!("role {}: {err}", db.code)))?;
        Ok(Role {
            code: db.code,
            name: db.name,
            department: db.department,
            category,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "store_clerk")]
    pub code: String,
    #[schema(example = "Store clerk")]
    pub name: String,
    #[schema(example = "store")]
    pub department: Option<String>,
    pub category: RoleCategory,
}

// =============================================================================
// RESOURCE CATALOG
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Resource {
    pub code: String,
    pub name: String,
    pub columns: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Resource {
    fn entity_type() -> &'static str { "resource" }
    fn subject_id(&self) -> String { self.code.clone() }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbResource {
    pub code: String,
    pub name: String,
    pub columns: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbResource> for Resource {
    type Error = AppError;

    fn try_from(db: DbResource) -> Result<Self, Self::Error> {
        Ok(Resource {
            columns: parse_json_column("resources.columns", &db.columns)?,
            code: db.code,
            name: db.name,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResourceUpsertRequest {
    #[schema(example = "Sales orders")]
    pub name: String,
    #[schema(example = json!(["order_no", "amount", "customer_phone"]))]
    pub columns: Vec<String>,
}

// =============================================================================
// RESOURCE PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResourcePermission {
    pub role_code: String,
    pub resource_code: String,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    #[schema(value_type = Object)]
    pub allowed_columns: AllOrSet,
    pub updated_at: DateTime<Utc>,
}

impl ResourcePermission {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::View => self.can_view,
            Action::Edit => self.can_edit,
            Action::Delete => self.can_delete,
        }
    }
}

impl Loggable for ResourcePermission {
    fn entity_type() -> &'static str { "resource_permission" }
    fn subject_id(&self) -> String { format!("{}/{}", self.role_code, self.resource_code) }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbResourcePermission {
    pub role_code: String,
    pub resource_code: String,
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub allowed_columns: String,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbResourcePermission> for ResourcePermission {
    type Error = AppError;

    fn try_from(db: DbResourcePermission) -> Result<Self, Self::Error> {
        Ok(ResourcePermission {
            allowed_columns: parse_json_column("resource_permissions.allowed_columns", &db.allowed_columns)?,
            role_code: db.role_code,
            resource_code: db.resource_code,
            can_view: db.can_view,
            can_edit: db.can_edit,
            can_delete: db.can_delete,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResourcePermissionUpsertRequest {
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
    /// `{"mode":"all"}` or `{"mode":"set","columns":[...]}`
    #[serde(default)]
    #[schema(value_type = Object)]
    pub allowed_columns: AllOrSet,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ColumnToggleRequest {
    #[schema(example = "customer_phone")]
    pub column: String,
}

// =============================================================================
// MENU PERMISSION
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MenuPermission {
    pub menu_id: String,
    pub allowed_roles: BTreeSet<RoleCategory>,
    /// Absent means no employee may open the menu
    pub allowed_departments: Option<BTreeSet<String>>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for MenuPermission {
    fn entity_type() -> &'static str { "menu_permission" }
    fn subject_id(&self) -> String { self.menu_id.clone() }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbMenuPermission {
    pub menu_id: String,
    pub allowed_roles: String,
    pub allowed_departments: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbMenuPermission> for MenuPermission {
    type Error = AppError;

    fn try_from(db: DbMenuPermission) -> Result<Self, Self::Error> {
        let allowed_departments = match db.allowed_departments.as_deref() {
            Some(raw) => Some(parse_json_column("menu_permissions.allowed_departments", raw)?),
            None => None,
        };
        Ok(MenuPermission {
            allowed_roles: parse_json_column("menu_permissions.allowed_roles", &db.allowed_roles)?,
            allowed_departments,
            menu_id: db.menu_id,
            updated_at: db.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MenuPermissionUpsertRequest {
    pub allowed_roles: BTreeSet<RoleCategory>,
    #[serde(default)]
    pub allowed_departments: Option<BTreeSet<String>>,
}
