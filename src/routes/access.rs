//! Access checks for callers that gate menus and resources on their side.
//!
//! A denial is a normal `200` answer with `allowed: false`. Only an unreachable store is an
//! error (`503`).

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::{Action, MenuDecision, ResourceAccess};
use crate::errors::AppError;
use crate::jwt::AuthUser;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/menu", post(check_menu))
        .route("/resource", post(check_resource))
        .route("/me/menus/:menu_id", get(my_menu))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MenuAccessRequest {
    #[schema(example = "emp-0042")]
    pub principal_id: String,
    #[schema(example = "orders.dashboard")]
    pub menu_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResourceAccessRequest {
    #[schema(example = "emp-0042")]
    pub principal_id: String,
    #[schema(example = "orders")]
    pub resource_code: String,
    pub action: Action,
}

/// Check whether a principal may open a menu
#[utoipa::path(
    post,
    path = "/access/menu",
    tag = "Access",
    request_body = MenuAccessRequest,
    responses(
        (status = 200, description = "Decision", body = MenuDecision),
        (status = 503, description = "Permission store unavailable"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_menu(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(req): Json<MenuAccessRequest>,
) -> Result<Json<MenuDecision>, AppError> {
    let decision = state.resolver.check_menu_access(&req.principal_id, &req.menu_id).await?;
    Ok(Json(decision))
}

/// Resolve a principal's access and column set on a resource
#[utoipa::path(
    post,
    path = "/access/resource",
    tag = "Access",
    request_body = ResourceAccessRequest,
    responses(
        (status = 200, description = "Decision with effective columns", body = ResourceAccess),
        (status = 503, description = "Permission store unavailable"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn check_resource(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(req): Json<ResourceAccessRequest>,
) -> Result<Json<ResourceAccess>, AppError> {
    let access = state
        .resolver
        .check_resource_access(&req.principal_id, &req.resource_code, req.action)
        .await?;
    Ok(Json(access))
}

/// Menu check for the calling principal
#[utoipa::path(
    get,
    path = "/access/me/menus/{menu_id}",
    tag = "Access",
    params(("menu_id" = String, Path, description = "Menu identifier")),
    responses((status = 200, description = "Decision", body = MenuDecision)),
    security(("bearerAuth" = []))
)]
pub async fn my_menu(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(menu_id): Path<String>,
) -> Result<Json<MenuDecision>, AppError> {
    let decision = state.resolver.check_menu_access(&auth.principal_id, &menu_id).await?;
    Ok(Json(decision))
}
