use std::sync::Arc;

use super::cache::{refresh_failed, PermissionCache};
use super::evaluator::{menu_decision, resource_decision, DecisionReason, MenuDecision, ResourceAccess};
use super::principal::Principal;
use super::{Action, AuthzMode};
use crate::errors::{AppError, AppResult};
use crate::store::DirectoryAdapter;

/// Answers "may this principal open this menu / act on this resource".
///
/// Principals come from the directory, roles and permissions from the cache. The decision
/// itself is delegated to the pure functions in `evaluator`.
#[derive(Clone)]
pub struct AuthorizationResolver {
    cache: Arc<PermissionCache>,
    directory: Arc<dyn DirectoryAdapter>,
}

impl AuthorizationResolver {
    pub fn new(cache: Arc<PermissionCache>, directory: Arc<dyn DirectoryAdapter>) -> Self {
        Self { cache, directory }
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// `None` for ids the directory does not know or has deactivated.
    pub async fn resolve_principal(&self, principal_id: &str) -> AppResult<Option<Principal>> {
        let Some(entry) = self.directory.principal(principal_id).await.map_err(refresh_failed)? else {
            return Ok(None);
        };

        let mut principal = Principal::new(entry.id).with_teams(entry.teams);
        if let Some(department) = entry.department {
            principal = principal.with_department(department);
        }
        if let Some(code) = entry.role_code {
            principal = match self.cache.role(&code).await? {
                Some(role) => principal.with_role(code, role.category),
                None => {
                    tracing::warn!(principal_id, role_code = %code, "principal references a missing role");
                    principal.with_orphaned_role(code)
                }
            };
        }

        Ok(Some(principal))
    }

    pub async fn menu_access(&self, principal: &Principal, menu_id: &str) -> AppResult<MenuDecision> {
        let permission = if principal.is_admin() {
            None
        } else {
            self.cache.menu_permission(menu_id).await?
        };

        let decision = menu_decision(principal, permission.as_ref());
        if decision.reason == DecisionReason::NotConfigured {
            tracing::warn!(menu_id, "menu has no permission row, denying");
        }
        tracing::debug!(principal_id = %principal.id, menu_id, allowed = decision.allowed, reason = ?decision.reason, "menu decision");
        Ok(decision)
    }

    pub async fn resource_access(&self, principal: &Principal, resource_code: &str, action: Action) -> AppResult<ResourceAccess> {
        let permission = match principal.effective_role_code() {
            Some(role_code) if !principal.is_admin() => self.cache.resource_permission(role_code, resource_code).await?,
            _ => None,
        };

        let access = resource_decision(principal, permission.as_ref(), action);
        if access.reason == DecisionReason::NotConfigured {
            tracing::warn!(
                role_code = principal.effective_role_code().unwrap_or_default(),
                resource_code,
                "resource has no permission row for role, denying"
            );
        }
        tracing::debug!(
            principal_id = %principal.id,
            resource_code,
            ?action,
            allowed = access.allowed,
            reason = ?access.reason,
            "resource decision"
        );
        Ok(access)
    }

    pub async fn check_menu_access(&self, principal_id: &str, menu_id: &str) -> AppResult<MenuDecision> {
        match self.resolve_principal(principal_id).await? {
            Some(principal) => self.menu_access(&principal, menu_id).await,
            None => Ok(MenuDecision::deny(DecisionReason::UnknownPrincipal)),
        }
    }

    pub async fn check_resource_access(&self, principal_id: &str, resource_code: &str, action: Action) -> AppResult<ResourceAccess> {
        match self.resolve_principal(principal_id).await? {
            Some(principal) => self.resource_access(&principal, resource_code, action).await,
            None => Ok(ResourceAccess::deny(DecisionReason::UnknownPrincipal)),
        }
    }

    /// Gate for the administrative API. `Advisory` logs the denial and lets the call through.
    pub async fn require_admin(&self, principal_id: &str, mode: AuthzMode) -> AppResult<()> {
        if mode == AuthzMode::Off {
            return Ok(());
        }

        let is_admin = self
            .resolve_principal(principal_id)
            .await?
            .is_some_and(|principal| principal.is_admin());
        if is_admin {
            return Ok(());
        }

        match mode {
            AuthzMode::Advisory => {
                tracing::warn!(principal_id, "non-admin call to administrative API allowed (advisory mode)");
                Ok(())
            }
            _ => Err(AppError::forbidden("administrator role required")),
        }
    }

    /// Like [`Self::check_resource_access`], but a denial is an error. Respects `mode` the same
    /// way [`Self::require_admin`] does.
    pub async fn require_resource(&self, principal_id: &str, resource_code: &str, action: Action, mode: AuthzMode) -> AppResult<()> {
        if mode == AuthzMode::Off {
            return Ok(());
        }

        let access = self.check_resource_access(principal_id, resource_code, action).await?;
        if access.allowed {
            return Ok(());
        }

        match mode {
            AuthzMode::Advisory => {
                tracing::warn!(principal_id, resource_code, ?action, reason = ?access.reason, "denied call allowed (advisory mode)");
                Ok(())
            }
            _ => Err(AppError::forbidden(format!("{action:?} on '{resource_code}' is not permitted"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::authz::{AllOrSet, RoleCategory};
    use crate::models::directory::DirectoryEntry;
    use crate::models::rbac::{MenuPermission, ResourcePermission, Role};
    use crate::store::PermissionStore;

    struct FakeStore {
        roles: HashMap<String, RoleCategory>,
        menus: HashMap<String, MenuPermission>,
        resources: HashMap<(String, String), ResourcePermission>,
        down: bool,
    }

    #[async_trait]
    impl PermissionStore for FakeStore {
        async fn role(&self, code: &str) -> AppResult<Option<Role>> {
            if self.down {
                return Err(AppError::store_unavailable("pool timed out"));
            }
            Ok(self.roles.get(code).map(|category| Role {
                code: code.to_string(),
                name: code.to_string(),
                department: None,
                category: *category,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        }

        async fn resource_permission(&self, role_code: &str, resource_code: &str) -> AppResult<Option<ResourcePermission>> {
            Ok(self.resources.get(&(role_code.to_string(), resource_code.to_string())).cloned())
        }

        async fn menu_permission(&self, menu_id: &str) -> AppResult<Option<MenuPermission>> {
            Ok(self.menus.get(menu_id).cloned())
        }
    }

    struct FakeDirectory(Vec<DirectoryEntry>);

    struct LockedDirectory;

    #[async_trait]
    impl DirectoryAdapter for LockedDirectory {
        async fn principal(&self, _id: &str) -> AppResult<Option<DirectoryEntry>> {
            Err(AppError::Database(sqlx::Error::Protocol("database is locked".into())))
        }

        async fn roster(&self, _team: &str) -> AppResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl DirectoryAdapter for FakeDirectory {
        async fn principal(&self, id: &str) -> AppResult<Option<DirectoryEntry>> {
            Ok(self.0.iter().find(|e| e.id == id).cloned())
        }

        async fn roster(&self, team: &str) -> AppResult<Vec<String>> {
            Ok(self.0.iter().filter(|e| e.teams.contains(team)).map(|e| e.id.clone()).collect())
        }
    }

    fn entry(id: &str, role: Option<&str>, department: Option<&str>) -> DirectoryEntry {
        DirectoryEntry {
            id: id.to_string(),
            name: id.to_string(),
            role_code: role.map(String::from),
            department: department.map(String::from),
            teams: BTreeSet::new(),
        }
    }

    fn resolver(down: bool) -> AuthorizationResolver {
        let mut roles = HashMap::new();
        roles.insert("root".to_string(), RoleCategory::Admin);
        roles.insert("clerk".to_string(), RoleCategory::Employee);

        let mut menus = HashMap::new();
        menus.insert(
            "orders".to_string(),
            MenuPermission {
                menu_id: "orders".to_string(),
                allowed_roles: [RoleCategory::Employee].into_iter().collect(),
                allowed_departments: Some(["sales".to_string()].into_iter().collect()),
                updated_at: Utc::now(),
            },
        );

        let mut resources = HashMap::new();
        resources.insert(
            ("clerk".to_string(), "orders".to_string()),
            ResourcePermission {
                role_code: "clerk".to_string(),
                resource_code: "orders".to_string(),
                can_view: true,
                can_edit: false,
                can_delete: false,
                allowed_columns: AllOrSet::All,
                updated_at: Utc::now(),
            },
        );

        let store = Arc::new(FakeStore { roles, menus, resources, down });
        let directory = Arc::new(FakeDirectory(vec![
            entry("ada", Some("root"), None),
            entry("bob", Some("clerk"), Some("sales")),
            entry("cat", Some("clerk"), Some("warehouse")),
            entry("dan", Some("gone"), Some("sales")),
        ]));
        AuthorizationResolver::new(Arc::new(PermissionCache::new(store, Duration::from_secs(60))), directory)
    }

    #[tokio::test]
    async fn menu_checks_follow_directory_and_role() {
        let resolver = resolver(false);

        let admin = resolver.check_menu_access("ada", "anything").await.unwrap();
        assert_eq!(admin.reason, DecisionReason::AdminOverride);

        assert!(resolver.check_menu_access("bob", "orders").await.unwrap().allowed);
        assert_eq!(
            resolver.check_menu_access("cat", "orders").await.unwrap().reason,
            DecisionReason::DepartmentNotAllowed
        );
        assert_eq!(resolver.check_menu_access("dan", "orders").await.unwrap().reason, DecisionReason::NoRole);
        assert_eq!(
            resolver.check_menu_access("nobody", "orders").await.unwrap().reason,
            DecisionReason::UnknownPrincipal
        );
    }

    #[tokio::test]
    async fn resource_checks_return_columns() {
        let resolver = resolver(false);

        let view = resolver.check_resource_access("bob", "orders", Action::View).await.unwrap();
        assert!(view.allowed);
        assert!(view.columns.is_all());

        let edit = resolver.check_resource_access("bob", "orders", Action::Edit).await.unwrap();
        assert!(!edit.allowed);

        let unknown = resolver.check_resource_access("bob", "invoices", Action::View).await.unwrap();
        assert_eq!(unknown.reason, DecisionReason::NotConfigured);
        assert!(unknown.columns.is_empty());
    }

    #[tokio::test]
    async fn admin_gate_respects_mode() {
        let resolver = resolver(false);

        assert!(resolver.require_admin("ada", AuthzMode::Strict).await.is_ok());
        assert!(matches!(
            resolver.require_admin("bob", AuthzMode::Strict).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(resolver.require_admin("bob", AuthzMode::Advisory).await.is_ok());
        assert!(resolver.require_admin("bob", AuthzMode::Off).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_store_is_not_a_deny() {
        let resolver = resolver(true);
        let err = resolver.check_menu_access("bob", "orders").await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn directory_failure_is_unavailable_not_a_deny() {
        let store = Arc::new(FakeStore {
            roles: HashMap::new(),
            menus: HashMap::new(),
            resources: HashMap::new(),
            down: false,
        });
        let resolver = AuthorizationResolver::new(
            Arc::new(PermissionCache::new(store, Duration::from_secs(60))),
            Arc::new(LockedDirectory),
        );

        let err = resolver.check_menu_access("bob", "orders").await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)), "{err:?}");
        let err = resolver.require_admin("bob", AuthzMode::Strict).await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)), "{err:?}");
    }
}
