use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::PermissionStore;
use crate::authz::AllOrSet;
use crate::errors::{AppError, AppResult};
use crate::models::rbac::{
    DbMenuPermission, DbResource, DbResourcePermission, DbRole, MenuPermission, Resource, ResourcePermission, Role,
    RoleCreateRequest,
};
use crate::utils::utc_now;

const ROLE_COLUMNS: &str = "code, name, department, category, created_at, updated_at";
const RESOURCE_PERMISSION_COLUMNS: &str =
    "role_code, resource_code, can_view, can_edit, can_delete, allowed_columns, updated_at";

#[derive(Debug, Clone)]
pub struct SqlitePermissionStore {
    pool: SqlitePool,
}

impl SqlitePermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        sqlx::query_as::<_, DbRole>(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY code"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Role::try_from)
            .collect()
    }

    pub async fn create_role(&self, req: RoleCreateRequest) -> AppResult<Role> {
        let code = req.code.trim().to_string();
        if code.is_empty() {
            return Err(AppError::bad_request("role code must not be empty"));
        }
        if self.role(&code).await?.is_some() {
            return Err(AppError::conflict(format!("role '{code}' already exists")));
        }

        let now = utc_now();
        sqlx::query(&format!("INSERT INTO roles ({ROLE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"))
            .bind(&code)
            .bind(&req.name)
            .bind(&req.department)
            .bind(req.category.as_str())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(Role {
            code,
            name: req.name,
            department: req.department,
            category: req.category,
            created_at: now,
            updated_at: now,
        })
    }

    /// Deletes a role nobody references. Its resource permissions go with it.
    pub async fn delete_role(&self, code: &str) -> AppResult<Role> {
        let role = self
            .role(code)
            .await?
            .ok_or_else(|| AppError::not_found(format!("role '{code}' not found")))?;

        let mut tx = self.pool.begin().await?;
        let references: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM principals WHERE role_code = ?")
            .bind(code)
            .fetch_one(&mut *tx)
            .await?;
        if references > 0 {
            return Err(AppError::conflict(format!(
                "role '{code}' is assigned to {references} principal(s)"
            )));
        }

        sqlx::query("DELETE FROM resource_permissions WHERE role_code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM roles WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(role)
    }

    // -------------------------------------------------------------------------
    // Resource catalog
    // -------------------------------------------------------------------------

    pub async fn list_resources(&self) -> AppResult<Vec<Resource>> {
        sqlx::query_as::<_, DbResource>("SELECT code, name, columns, created_at, updated_at FROM resources ORDER BY code")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Resource::try_from)
            .collect()
    }

    pub async fn resource(&self, code: &str) -> AppResult<Option<Resource>> {
        sqlx::query_as::<_, DbResource>("SELECT code, name, columns, created_at, updated_at FROM resources WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(Resource::try_from)
            .transpose()
    }

    pub async fn upsert_resource(&self, code: &str, name: &str, columns: BTreeSet<String>) -> AppResult<Resource> {
        let now = utc_now();
        let columns_json = serde_json::to_string(&columns).map_err(|e| AppError::internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO resources (code, name, columns, created_at, updated_at) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(code) DO UPDATE SET name = excluded.name, columns = excluded.columns, updated_at = excluded.updated_at
            "#,
        )
        .bind(code)
        .bind(name)
        .bind(&columns_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.resource(code)
            .await?
            .ok_or_else(|| AppError::internal(format!("resource '{code}' vanished after upsert")))
    }

    // -------------------------------------------------------------------------
    // Resource permissions
    // -------------------------------------------------------------------------

    pub async fn list_resource_permissions(&self, role_code: &str) -> AppResult<Vec<ResourcePermission>> {
        sqlx::query_as::<_, DbResourcePermission>(&format!(
            "SELECT {RESOURCE_PERMISSION_COLUMNS} FROM resource_permissions WHERE role_code = ? ORDER BY resource_code"
        ))
        .bind(role_code)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(ResourcePermission::try_from)
        .collect()
    }

    pub async fn upsert_resource_permission(
        &self,
        role_code: &str,
        resource_code: &str,
        can_view: bool,
        can_edit: bool,
        can_delete: bool,
        allowed_columns: AllOrSet,
    ) -> AppResult<ResourcePermission> {
        let now = utc_now();
        let columns_json = serde_json::to_string(&allowed_columns).map_err(|e| AppError::internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO resource_permissions (role_code, resource_code, can_view, can_edit, can_delete, allowed_columns, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(role_code, resource_code) DO UPDATE SET
                can_view = excluded.can_view,
                can_edit = excluded.can_edit,
                can_delete = excluded.can_delete,
                allowed_columns = excluded.allowed_columns,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(role_code)
        .bind(resource_code)
        .bind(can_view)
        .bind(can_edit)
        .bind(can_delete)
        .bind(&columns_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ResourcePermission {
            role_code: role_code.to_string(),
            resource_code: resource_code.to_string(),
            can_view,
            can_edit,
            can_delete,
            allowed_columns,
            updated_at: now,
        })
    }

    pub async fn delete_resource_permission(&self, role_code: &str, resource_code: &str) -> AppResult<Option<ResourcePermission>> {
        let existing = self.resource_permission(role_code, resource_code).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM resource_permissions WHERE role_code = ? AND resource_code = ?")
                .bind(role_code)
                .bind(resource_code)
                .execute(&self.pool)
                .await?;
        }
        Ok(existing)
    }

    // -------------------------------------------------------------------------
    // Menu permissions
    // -------------------------------------------------------------------------

    pub async fn list_menu_permissions(&self) -> AppResult<Vec<MenuPermission>> {
        sqlx::query_as::<_, DbMenuPermission>(
            "SELECT menu_id, allowed_roles, allowed_departments, updated_at FROM menu_permissions ORDER BY menu_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(MenuPermission::try_from)
        .collect()
    }

    pub async fn upsert_menu_permission(&self, permission: &MenuPermission) -> AppResult<()> {
        let roles_json =
            serde_json::to_string(&permission.allowed_roles).map_err(|e| AppError::internal(e.to_string()))?;
        let departments_json = permission
            .allowed_departments
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO menu_permissions (menu_id, allowed_roles, allowed_departments, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(menu_id) DO UPDATE SET
                allowed_roles = excluded.allowed_roles,
                allowed_departments = excluded.allowed_departments,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&permission.menu_id)
        .bind(&roles_json)
        .bind(&departments_json)
        .bind(permission.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_menu_permission(&self, menu_id: &str) -> AppResult<Option<MenuPermission>> {
        let existing = self.menu_permission(menu_id).await?;
        if existing.is_some() {
            sqlx::query("DELETE FROM menu_permissions WHERE menu_id = ?")
                .bind(menu_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(existing)
    }
}

#[async_trait]
impl PermissionStore for SqlitePermissionStore {
    async fn role(&self, code: &str) -> AppResult<Option<Role>> {
        sqlx::query_as::<_, DbRole>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE code = ?"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(Role::try_from)
            .transpose()
    }

    async fn resource_permission(&self, role_code: &str, resource_code: &str) -> AppResult<Option<ResourcePermission>> {
        sqlx::query_as::<_, DbResourcePermission>(&format!(
            "SELECT {RESOURCE_PERMISSION_COLUMNS} FROM resource_permissions WHERE role_code = ? AND resource_code = ?"
        ))
        .bind(role_code)
        .bind(resource_code)
        .fetch_optional(&self.pool)
        .await?
        .map(ResourcePermission::try_from)
        .transpose()
    }

    async fn menu_permission(&self, menu_id: &str) -> AppResult<Option<MenuPermission>> {
        sqlx::query_as::<_, DbMenuPermission>(
            "SELECT menu_id, allowed_roles, allowed_departments, updated_at FROM menu_permissions WHERE menu_id = ?",
        )
        .bind(menu_id)
        .fetch_optional(&self.pool)
        .await?
        .map(MenuPermission::try_from)
        .transpose()
    }
}
