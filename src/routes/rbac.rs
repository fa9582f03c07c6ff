//! Permission administration API
//!
//! Roles, the resource column catalog, role x resource permissions and menu permissions.
//! Every write is logged to the activity log with Critical severity and invalidates the
//! permission cache before the response is sent.

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};

use crate::app::AppState;
use crate::authz::AllOrSet;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::rbac::*;
use crate::store::PermissionStore;
use crate::utils::utc_now;

// =============================================================================
// ROUTER
// =============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        // Roles
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:code", get(get_role).delete(delete_role))
        // Resource catalog
        .route("/resources", get(list_resources))
        .route("/resources/:code", put(upsert_resource))
        // Role x resource permissions
        .route("/roles/:code/resources", get(list_role_resources))
        .route(
            "/roles/:code/resources/:resource",
            put(put_role_resource).delete(delete_role_resource),
        )
        .route("/roles/:code/resources/:resource/columns/toggle", post(toggle_column))
        // Menus
        .route("/menus", get(list_menus))
        .route("/menus/:menu_id", put(put_menu).delete(delete_menu))
}

async fn ensure_admin(state: &AppState, auth: &AuthUser) -> AppResult<()> {
    state
        .resolver
        .require_admin(&auth.principal_id, state.config.authz_mode)
        .await
}

async fn existing_role(state: &AppState, code: &str) -> AppResult<Role> {
    state
        .permissions
        .role(code)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role '{code}' not found")))
}

// =============================================================================
// ROLE ENDPOINTS
// =============================================================================

/// List all roles
#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses(
        (status = 200, description = "List of roles", body = Vec<Role>),
        (status = 403, description = "Caller is not an administrator"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    ensure_admin(&state, &auth).await?;
    Ok(Json(state.permissions.list_roles().await?))
}

/// Create a new role
#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role code already exists"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    ensure_admin(&state, &auth).await?;

    let role = state.permissions.create_role(req).await?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(&auth.principal_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

/// Get a role by code
#[utoipa::path(
    get,
    path = "/rbac/roles/{code}",
    tag = "RBAC",
    params(("code" = String, Path, description = "Role code")),
    responses(
        (status = 200, description = "Role details", body = Role),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role(State(state): State<AppState>, auth: AuthUser, Path(code): Path<String>) -> AppResult<Json<Role>> {
    ensure_admin(&state, &auth).await?;
    Ok(Json(existing_role(&state, &code).await?))
}

/// Delete a role no principal references
#[utoipa::path(
    delete,
    path = "/rbac/roles/{code}",
    tag = "RBAC",
    params(("code" = String, Path, description = "Role code")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role still assigned to principals"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> AppResult<StatusCode> {
    ensure_admin(&state, &auth).await?;

    let role = state.permissions.delete_role(&code).await?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(&auth.principal_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// RESOURCE CATALOG ENDPOINTS
// =============================================================================

/// List the resource catalog
#[utoipa::path(
    get,
    path = "/rbac/resources",
    tag = "RBAC",
    responses((status = 200, description = "Resources with their column universe", body = Vec<Resource>)),
    security(("bearerAuth" = []))
)]
pub async fn list_resources(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Resource>>> {
    ensure_admin(&state, &auth).await?;
    Ok(Json(state.permissions.list_resources().await?))
}

/// Create or replace a resource and its column universe
#[utoipa::path(
    put,
    path = "/rbac/resources/{code}",
    tag = "RBAC",
    params(("code" = String, Path, description = "Resource code")),
    request_body = ResourceUpsertRequest,
    responses(
        (status = 200, description = "Resource stored", body = Resource),
        (status = 400, description = "Invalid resource"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(req): Json<ResourceUpsertRequest>,
) -> AppResult<Json<Resource>> {
    ensure_admin(&state, &auth).await?;

    let columns: BTreeSet<String> = req
        .columns
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if code.trim().is_empty() {
        return Err(AppError::bad_request("resource code must not be empty"));
    }

    let old = state.permissions.resource(&code).await?;
    let resource = state.permissions.upsert_resource(&code, &req.name, columns).await?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(&auth.principal_id),
        &resource,
        old.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(resource))
}

// =============================================================================
// RESOURCE PERMISSION ENDPOINTS
// =============================================================================

/// List a role's resource permissions
#[utoipa::path(
    get,
    path = "/rbac/roles/{code}/resources",
    tag = "RBAC",
    params(("code" = String, Path, description = "Role code")),
    responses(
        (status = 200, description = "Resource permissions of the role", body = Vec<ResourcePermission>),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_role_resources(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(code): Path<String>,
) -> AppResult<Json<Vec<ResourcePermission>>> {
    ensure_admin(&state, &auth).await?;
    existing_role(&state, &code).await?;
    Ok(Json(state.permissions.list_resource_permissions(&code).await?))
}

/// Set a role's flags and columns on a resource
#[utoipa::path(
    put,
    path = "/rbac/roles/{code}/resources/{resource}",
    tag = "RBAC",
    params(
        ("code" = String, Path, description = "Role code"),
        ("resource" = String, Path, description = "Resource code"),
    ),
    request_body = ResourcePermissionUpsertRequest,
    responses(
        (status = 200, description = "Permission stored", body = ResourcePermission),
        (status = 404, description = "Role not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn put_role_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((code, resource)): Path<(String, String)>,
    Json(req): Json<ResourcePermissionUpsertRequest>,
) -> AppResult<Json<ResourcePermission>> {
    ensure_admin(&state, &auth).await?;
    existing_role(&state, &code).await?;

    // Catalogued resources get their selection normalized against the universe
    let allowed_columns = match (state.permissions.resource(&resource).await?, req.allowed_columns) {
        (Some(catalog), AllOrSet::Set(selected)) => AllOrSet::from_selection(selected, &catalog.columns),
        (_, columns) => columns,
    };

    let old = state.permissions.resource_permission(&code, &resource).await?;
    let permission = state
        .permissions
        .upsert_resource_permission(&code, &resource, req.can_view, req.can_edit, req.can_delete, allowed_columns)
        .await?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(&auth.principal_id),
        &permission,
        old.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

/// Remove a role's permission on a resource
#[utoipa::path(
    delete,
    path = "/rbac/roles/{code}/resources/{resource}",
    tag = "RBAC",
    params(
        ("code" = String, Path, description = "Role code"),
        ("resource" = String, Path, description = "Resource code"),
    ),
    responses(
        (status = 204, description = "Permission removed"),
        (status = 404, description = "No such permission"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_role_resource(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((code, resource)): Path<(String, String)>,
) -> AppResult<StatusCode> {
    ensure_admin(&state, &auth).await?;

    let removed = state
        .permissions
        .delete_resource_permission(&code, &resource)
        .await?
        .ok_or_else(|| AppError::not_found(format!("role '{code}' has no permission on '{resource}'")))?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(&auth.principal_id),
        &removed,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Flip one column in or out of a role's column set
#[utoipa::path(
    post,
    path = "/rbac/roles/{code}/resources/{resource}/columns/toggle",
    tag = "RBAC",
    params(
        ("code" = String, Path, description = "Role code"),
        ("resource" = String, Path, description = "Resource code"),
    ),
    request_body = ColumnToggleRequest,
    responses(
        (status = 200, description = "Updated permission", body = ResourcePermission),
        (status = 400, description = "Column not in the resource catalog"),
        (status = 404, description = "Role or resource not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn toggle_column(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((code, resource)): Path<(String, String)>,
    Json(req): Json<ColumnToggleRequest>,
) -> AppResult<Json<ResourcePermission>> {
    ensure_admin(&state, &auth).await?;
    existing_role(&state, &code).await?;

    let catalog = state
        .permissions
        .resource(&resource)
        .await?
        .ok_or_else(|| AppError::not_found(format!("resource '{resource}' is not in the catalog")))?;
    if !catalog.columns.contains(&req.column) {
        return Err(AppError::bad_request(format!(
            "column '{}' is not a column of '{resource}'",
            req.column
        )));
    }

    let old = state.permissions.resource_permission(&code, &resource).await?;
    let (can_view, can_edit, can_delete, current) = match &old {
        Some(p) => (p.can_view, p.can_edit, p.can_delete, p.allowed_columns.clone()),
        None => (false, false, false, AllOrSet::empty()),
    };
    let toggled = current.toggle(&catalog.columns, &req.column);

    let permission = state
        .permissions
        .upsert_resource_permission(&code, &resource, can_view, can_edit, can_delete, toggled)
        .await?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(&auth.principal_id),
        &permission,
        old.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

// =============================================================================
// MENU PERMISSION ENDPOINTS
// =============================================================================

/// List menu permissions
#[utoipa::path(
    get,
    path = "/rbac/menus",
    tag = "RBAC",
    responses((status = 200, description = "Menu permissions", body = Vec<MenuPermission>)),
    security(("bearerAuth" = []))
)]
pub async fn list_menus(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<MenuPermission>>> {
    ensure_admin(&state, &auth).await?;
    Ok(Json(state.permissions.list_menu_permissions().await?))
}

/// Create or replace a menu permission
#[utoipa::path(
    put,
    path = "/rbac/menus/{menu_id}",
    tag = "RBAC",
    params(("menu_id" = String, Path, description = "Menu identifier")),
    request_body = MenuPermissionUpsertRequest,
    responses((status = 200, description = "Menu permission stored", body = MenuPermission)),
    security(("bearerAuth" = []))
)]
pub async fn put_menu(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(menu_id): Path<String>,
    Json(req): Json<MenuPermissionUpsertRequest>,
) -> AppResult<Json<MenuPermission>> {
    ensure_admin(&state, &auth).await?;

    let old = state.permissions.menu_permission(&menu_id).await?;
    let permission = MenuPermission {
        menu_id,
        allowed_roles: req.allowed_roles,
        allowed_departments: req.allowed_departments,
        updated_at: utc_now(),
    };
    state.permissions.upsert_menu_permission(&permission).await?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(&auth.principal_id),
        &permission,
        old.as_ref(),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

/// Remove a menu permission; the menu becomes admin-only
#[utoipa::path(
    delete,
    path = "/rbac/menus/{menu_id}",
    tag = "RBAC",
    params(("menu_id" = String, Path, description = "Menu identifier")),
    responses(
        (status = 204, description = "Menu permission removed"),
        (status = 404, description = "Menu permission not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_menu(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(menu_id): Path<String>,
) -> AppResult<StatusCode> {
    ensure_admin(&state, &auth).await?;

    let removed = state
        .permissions
        .delete_menu_permission(&menu_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("menu '{menu_id}' has no permission row")))?;
    state.resolver.cache().invalidate();

    log_activity_with_context(
        &state.event_bus,
        "deleted",
        Some(&auth.principal_id),
        &removed,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
